//! Typed accessors for the live header fields.
//!
//! The frame counter, frame rate, flags and top layer are worker-written. The only exception is
//! [`StateFlags::CLIENT_CONNECTED`], which belongs to the host; flags are therefore changed with
//! atomic read-modify-write at bit granularity and never stored wholesale.

use core::sync::atomic::Ordering;

use bitflags::bitflags;

use crate::layout::{offset, NO_LAYER};
use crate::region::SharedRegion;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateFlags: u32 {
        const SLEEPING = 0x01;
        const DEBUG_MODE = 0x02;
        const TEXT_INPUT_FOCUS = 0x04;
        const SERVER_READY = 0x08;
        const CLIENT_CONNECTED = 0x10;
    }
}

/// A consistent-enough copy of the header for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSnapshot {
    pub magic: u32,
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub frame_rate: u32,
    pub flags: StateFlags,
    /// Ordinal of the top closable layer, if any.
    pub top_closable_layer: Option<u32>,
    pub input_head: u32,
    pub input_tail: u32,
}

impl SharedRegion {
    pub fn frame_count(&self) -> u32 {
        self.load(offset::FRAME_COUNT, Ordering::Acquire)
    }

    /// Worker only. Use [`crate::publish::publish_frame`] for normal frame publication.
    pub fn set_frame_count(&self, count: u32) {
        self.store(offset::FRAME_COUNT, count, Ordering::Release);
    }

    pub fn frame_rate(&self) -> u32 {
        self.load(offset::FRAME_RATE, Ordering::Acquire)
    }

    pub fn set_frame_rate(&self, fps: u32) {
        self.store(offset::FRAME_RATE, fps, Ordering::Release);
    }

    pub fn flags(&self) -> StateFlags {
        StateFlags::from_bits_retain(self.load(offset::STATE_FLAGS, Ordering::Acquire))
    }

    pub fn has_flag(&self, flag: StateFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn set_flag(&self, flag: StateFlags, on: bool) {
        if on {
            self.fetch_or(offset::STATE_FLAGS, flag.bits(), Ordering::AcqRel);
        } else {
            self.fetch_and(offset::STATE_FLAGS, !flag.bits(), Ordering::AcqRel);
        }
    }

    pub fn top_closable_layer(&self) -> Option<u32> {
        let raw = self.load(offset::TOP_CLOSABLE_LAYER, Ordering::Acquire) as i32;
        (raw >= 0).then_some(raw as u32)
    }

    pub fn set_top_closable_layer(&self, layer: Option<u32>) {
        let raw = layer.map_or(NO_LAYER, |l| l as i32);
        self.store(offset::TOP_CLOSABLE_LAYER, raw as u32, Ordering::Release);
    }

    pub fn tick_request(&self) -> u32 {
        self.load(offset::TICK_REQUEST, Ordering::Acquire)
    }

    /// Host only. Returns the new request value.
    pub fn bump_tick_request(&self) -> u32 {
        let next = self.tick_request().wrapping_add(1);
        self.store(offset::TICK_REQUEST, next, Ordering::Release);
        next
    }

    pub fn tick_ack(&self) -> u32 {
        self.load(offset::TICK_ACK, Ordering::Acquire)
    }

    /// Worker only.
    pub fn set_tick_ack(&self, value: u32) {
        self.store(offset::TICK_ACK, value, Ordering::Release);
    }

    /// Worker only, on a region no host has attached to yet: start both pacing counters at
    /// `value` so a replacement region continues the host's sequence.
    pub fn seed_tick_counters(&self, value: u32) {
        self.store(offset::TICK_REQUEST, value, Ordering::Relaxed);
        self.store(offset::TICK_ACK, value, Ordering::Release);
    }

    pub fn snapshot(&self) -> HeaderSnapshot {
        HeaderSnapshot {
            magic: self.load(offset::MAGIC, Ordering::Acquire),
            version: self.load(offset::VERSION, Ordering::Relaxed),
            width: self.load(offset::WIDTH, Ordering::Relaxed),
            height: self.load(offset::HEIGHT, Ordering::Relaxed),
            frame_count: self.frame_count(),
            frame_rate: self.frame_rate(),
            flags: self.flags(),
            top_closable_layer: self.top_closable_layer(),
            input_head: self.load(offset::INPUT_QUEUE_HEAD, Ordering::Acquire),
            input_tail: self.load(offset::INPUT_QUEUE_TAIL, Ordering::Acquire),
        }
    }
}

/// `true` once the worker has served request `req`, treating both counters as wrapping.
pub fn tick_served(ack: u32, req: u32) -> bool {
    ack.wrapping_sub(req) as i32 >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent_bits() {
        let region = SharedRegion::heap("t", 1, 1).unwrap();
        region.set_flag(StateFlags::SERVER_READY, true);
        region.set_flag(StateFlags::CLIENT_CONNECTED, true);
        region.set_flag(StateFlags::SLEEPING, true);
        region.set_flag(StateFlags::SLEEPING, false);
        assert_eq!(
            region.flags(),
            StateFlags::SERVER_READY | StateFlags::CLIENT_CONNECTED
        );
        let bytes = region.to_bytes();
        assert_eq!(&bytes[24..28], &0x18u32.to_le_bytes());
    }

    #[test]
    fn top_layer_uses_minus_one_for_none() {
        let region = SharedRegion::heap("t", 1, 1).unwrap();
        assert_eq!(region.top_closable_layer(), None);
        region.set_top_closable_layer(Some(4));
        assert_eq!(region.top_closable_layer(), Some(4));
        region.set_top_closable_layer(None);
        assert_eq!(&region.to_bytes()[28..32], &(-1i32).to_le_bytes());
    }

    #[test]
    fn tick_ordering_survives_wrap() {
        assert!(tick_served(5, 5));
        assert!(tick_served(6, 5));
        assert!(!tick_served(4, 5));
        assert!(tick_served(0, u32::MAX));
        assert!(!tick_served(u32::MAX, 0));
    }

    #[test]
    fn snapshot_reflects_header() {
        let region = SharedRegion::heap("t", 3, 2).unwrap();
        region.set_frame_rate(30);
        region.set_frame_count(9);
        let snap = region.snapshot();
        assert_eq!(snap.width, 3);
        assert_eq!(snap.height, 2);
        assert_eq!(snap.frame_rate, 30);
        assert_eq!(snap.frame_count, 9);
        assert_eq!(snap.input_head, 0);
        assert_eq!(snap.top_closable_layer, None);
    }
}
