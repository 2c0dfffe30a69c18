//! Frame publication.
//!
//! The worker writes the pixel body and the frame counter inside a sequence lock kept in the
//! `PUBLISH_SEQ` header word: the sequence is odd while the body is in flux. A reader copies the
//! body into a private buffer and only accepts the copy when the sequence was even and unchanged
//! across the read, so it either sees a complete old frame or a complete new one.

use core::sync::atomic::{fence, Ordering};

use crate::error::{IpcError, Result};
use crate::layout::offset;
use crate::region::SharedRegion;

/// Attempts a reader makes before giving up on a frame and keeping the previous one.
pub const MAX_READ_ATTEMPTS: u32 = 64;

/// Worker side. Copies `pixels` into the region and advances the frame counter.
///
/// Returns the new frame count.
pub fn publish_frame(region: &SharedRegion, pixels: &[u32]) -> Result<u32> {
    if pixels.len() != region.pixel_count() {
        return Err(IpcError::RegionSizeMismatch {
            actual: pixels.len() * 4,
            expected: region.pixel_count() * 4,
        });
    }

    let seq = region.load(offset::PUBLISH_SEQ, Ordering::Relaxed);
    region.store(offset::PUBLISH_SEQ, seq.wrapping_add(1), Ordering::Relaxed);
    fence(Ordering::Release);

    for (i, px) in pixels.iter().enumerate() {
        region.store_pixel(i, *px);
    }

    let frame = region.frame_count().wrapping_add(1);
    region.store(offset::FRAME_COUNT, frame, Ordering::Release);
    region.store(offset::PUBLISH_SEQ, seq.wrapping_add(2), Ordering::Release);
    Ok(frame)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The frame counter has not moved since the last accepted frame.
    Unchanged,
    /// A complete new frame was copied. `retries` counts discarded torn reads.
    Updated { frame_count: u32, retries: u32 },
    /// Every attempt raced a publish; the previous frame is kept.
    Torn { retries: u32 },
}

/// Host side double buffer over a region's pixel body.
#[derive(Debug, Clone)]
pub struct FrameReader {
    front: Vec<u32>,
    back: Vec<u32>,
    frame_count: Option<u32>,
}

impl FrameReader {
    pub fn new(pixel_count: usize) -> Self {
        Self {
            front: vec![0; pixel_count],
            back: vec![0; pixel_count],
            frame_count: None,
        }
    }

    /// Forget the cached frame, e.g. after re-attaching to a resized region.
    pub fn reset(&mut self, pixel_count: usize) {
        self.front = vec![0; pixel_count];
        self.back = vec![0; pixel_count];
        self.frame_count = None;
    }

    pub fn pixels(&self) -> &[u32] {
        &self.front
    }

    pub fn frame_count(&self) -> Option<u32> {
        self.frame_count
    }

    /// Pull the latest frame if the counter changed since the last accepted one.
    pub fn refresh(&mut self, region: &SharedRegion) -> Refresh {
        if self.back.len() != region.pixel_count() {
            self.reset(region.pixel_count());
        }
        if self.frame_count == Some(region.frame_count()) {
            return Refresh::Unchanged;
        }

        let mut retries = 0;
        for attempt in 0..MAX_READ_ATTEMPTS {
            if attempt > 8 {
                std::thread::yield_now();
            }

            let s0 = region.load(offset::PUBLISH_SEQ, Ordering::Acquire);
            if s0 & 1 == 1 {
                retries += 1;
                core::hint::spin_loop();
                continue;
            }

            let frame = region.load(offset::FRAME_COUNT, Ordering::Relaxed);
            for (i, px) in self.back.iter_mut().enumerate() {
                *px = region.load_pixel(i);
            }

            fence(Ordering::Acquire);
            let s1 = region.load(offset::PUBLISH_SEQ, Ordering::Relaxed);
            if s0 != s1 {
                retries += 1;
                continue;
            }

            std::mem::swap(&mut self.front, &mut self.back);
            self.frame_count = Some(frame);
            return Refresh::Updated {
                frame_count: frame,
                retries,
            };
        }
        Refresh::Torn { retries }
    }
}
