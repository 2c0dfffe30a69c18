//! Shared region storage.
//!
//! A region is an array of 32-bit words. Every access (header fields, ring slots, pixels) goes
//! through an `AtomicU32`, so the worker and the host may touch the same memory concurrently
//! without data races, whether it lives on the heap (thread mode) or in a mapped file (process
//! mode). Values are stored little-endian regardless of host byte order.

use core::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;

use crate::error::{IpcError, Result};
use crate::layout::{
    offset, pixel_bytes, region_bytes, valid_dimensions, DEFAULT_FRAME_RATE, INPUT_EVENT_BYTES,
    INPUT_QUEUE_SLOTS, MAGIC, NO_LAYER, VERSION,
};

enum Backing {
    Heap(#[allow(dead_code)] Box<[AtomicU32]>),
    Mapped(MmapMut),
}

pub struct SharedRegion {
    name: String,
    width: u32,
    height: u32,
    len_words: usize,

    words: *const AtomicU32,
    backing: Backing,
}

// SAFETY: `words` points into `backing`, which is owned by the region and never reallocated.
// All accesses go through atomics.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mapped", &matches!(self.backing, Backing::Mapped(_)))
            .finish()
    }
}

impl SharedRegion {
    /// Allocate a zeroed heap region and initialise its header.
    pub fn heap(name: impl Into<String>, width: u32, height: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        let len_words = region_bytes(width, height) / 4;
        let storage: Box<[AtomicU32]> = (0..len_words).map(|_| AtomicU32::new(0)).collect();
        let words = storage.as_ptr();
        let region = Self {
            name: name.into(),
            width,
            height,
            len_words,
            words,
            backing: Backing::Heap(storage),
        };
        region.init_header();
        Ok(region)
    }

    /// Wrap a freshly created, zero-filled mapping and initialise its header.
    pub(crate) fn create_mapped(
        name: impl Into<String>,
        mut map: MmapMut,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        check_dimensions(width, height)?;
        let expected = region_bytes(width, height);
        if map.len() != expected {
            return Err(IpcError::RegionSizeMismatch {
                actual: map.len(),
                expected,
            });
        }
        let words = map.as_mut_ptr() as *const AtomicU32;
        let region = Self {
            name: name.into(),
            width,
            height,
            len_words: expected / 4,
            words,
            backing: Backing::Mapped(map),
        };
        region.init_header();
        Ok(region)
    }

    /// Wrap an existing mapping created by another process, validating its header.
    pub(crate) fn attach_mapped(name: impl Into<String>, mut map: MmapMut) -> Result<Self> {
        let name = name.into();
        let len = map.len();
        if len < offset::PIXELS || len % 4 != 0 {
            return Err(IpcError::RegionSizeMismatch {
                actual: len,
                expected: offset::PIXELS,
            });
        }
        let words = map.as_mut_ptr() as *const AtomicU32;
        let mut region = Self {
            name,
            width: 0,
            height: 0,
            len_words: len / 4,
            words,
            backing: Backing::Mapped(map),
        };
        let (width, height) = region.validate()?;
        region.width = width;
        region.height = height;
        Ok(region)
    }

    fn init_header(&self) {
        self.store(offset::VERSION, VERSION, Ordering::Relaxed);
        self.store(offset::WIDTH, self.width, Ordering::Relaxed);
        self.store(offset::HEIGHT, self.height, Ordering::Relaxed);
        self.store(offset::FRAME_RATE, DEFAULT_FRAME_RATE, Ordering::Relaxed);
        self.store(offset::TOP_CLOSABLE_LAYER, NO_LAYER as u32, Ordering::Relaxed);
        // Magic last: a concurrent attacher never sees a valid magic over a half-built header.
        self.store(offset::MAGIC, MAGIC, Ordering::Release);
    }

    /// Check magic, version, dimensions and backing size. Returns `(width, height)`.
    pub fn validate(&self) -> Result<(u32, u32)> {
        let magic = self.load(offset::MAGIC, Ordering::Acquire);
        if magic == 0 {
            return Err(IpcError::Retired(self.name.clone()));
        }
        if magic != MAGIC {
            return Err(IpcError::BadMagic {
                found: magic,
                expected: MAGIC,
            });
        }
        let version = self.load(offset::VERSION, Ordering::Relaxed);
        if version != VERSION {
            return Err(IpcError::VersionMismatch {
                found: version,
                expected: VERSION,
            });
        }
        let width = self.load(offset::WIDTH, Ordering::Relaxed);
        let height = self.load(offset::HEIGHT, Ordering::Relaxed);
        check_dimensions(width, height)?;
        let expected = region_bytes(width, height);
        if self.byte_len() != expected {
            return Err(IpcError::RegionSizeMismatch {
                actual: self.byte_len(),
                expected,
            });
        }
        Ok((width, height))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn byte_len(&self) -> usize {
        self.len_words * 4
    }

    pub fn pixel_count(&self) -> usize {
        pixel_bytes(self.width, self.height) / 4
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    /// A retired region has had its magic cleared by the worker after a resize or shutdown.
    pub fn is_retired(&self) -> bool {
        self.load(offset::MAGIC, Ordering::Acquire) != MAGIC
    }

    pub fn retire(&self) {
        self.store(offset::MAGIC, 0, Ordering::Release);
    }

    /// Flush a mapped region to its backing file. No-op for heap regions.
    pub fn flush(&self) -> Result<()> {
        if let Backing::Mapped(map) = &self.backing {
            map.flush()?;
        }
        Ok(())
    }

    #[inline]
    fn word(&self, byte_offset: usize) -> &AtomicU32 {
        debug_assert_eq!(byte_offset % 4, 0);
        let index = byte_offset / 4;
        assert!(index < self.len_words, "offset {byte_offset} outside region");
        // SAFETY: bounds checked above; the backing outlives `&self`.
        unsafe { &*self.words.add(index) }
    }

    #[inline]
    pub(crate) fn load(&self, byte_offset: usize, order: Ordering) -> u32 {
        u32::from_le(self.word(byte_offset).load(order))
    }

    #[inline]
    pub(crate) fn store(&self, byte_offset: usize, value: u32, order: Ordering) {
        self.word(byte_offset).store(value.to_le(), order);
    }

    #[inline]
    pub(crate) fn fetch_or(&self, byte_offset: usize, mask: u32, order: Ordering) -> u32 {
        u32::from_le(self.word(byte_offset).fetch_or(mask.to_le(), order))
    }

    #[inline]
    pub(crate) fn fetch_and(&self, byte_offset: usize, mask: u32, order: Ordering) -> u32 {
        u32::from_le(self.word(byte_offset).fetch_and(mask.to_le(), order))
    }

    #[inline]
    pub(crate) fn load_pixel(&self, index: usize) -> u32 {
        self.load(offset::PIXELS + index * 4, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn store_pixel(&self, index: usize, argb: u32) {
        self.store(offset::PIXELS + index * 4, argb, Ordering::Relaxed);
    }

    pub(crate) fn load_slot(&self, slot: usize) -> [u32; INPUT_EVENT_BYTES / 4] {
        debug_assert!(slot < INPUT_QUEUE_SLOTS);
        let base = offset::INPUT_QUEUE + slot * INPUT_EVENT_BYTES;
        let mut words = [0u32; INPUT_EVENT_BYTES / 4];
        for (i, w) in words.iter_mut().enumerate() {
            *w = self.load(base + i * 4, Ordering::Relaxed);
        }
        words
    }

    pub(crate) fn store_slot(&self, slot: usize, words: &[u32; INPUT_EVENT_BYTES / 4]) {
        debug_assert!(slot < INPUT_QUEUE_SLOTS);
        let base = offset::INPUT_QUEUE + slot * INPUT_EVENT_BYTES;
        for (i, w) in words.iter().enumerate() {
            self.store(base + i * 4, *w, Ordering::Relaxed);
        }
    }

    /// Copy the whole region out as little-endian bytes. Intended for debugging and tests.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for i in 0..self.len_words {
            out.extend_from_slice(&self.load(i * 4, Ordering::Relaxed).to_le_bytes());
        }
        out
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if valid_dimensions(width, height) {
        Ok(())
    } else {
        Err(IpcError::InvalidDimensions { width, height })
    }
}
