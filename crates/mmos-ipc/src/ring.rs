//! Single-producer / single-consumer input ring inside the shared region.
//!
//! `head` and `tail` are slot indices in `0..INPUT_QUEUE_SLOTS`. The host is the only writer of
//! `tail` and of the slots between `tail` and `head`; the worker is the only writer of `head`.
//! One slot is kept empty to tell "full" from "empty", so usable capacity is
//! `INPUT_QUEUE_SLOTS - 1`. A full ring rejects the new event; the producer never touches
//! `head`.

use core::sync::atomic::Ordering;

use crate::input::{self, InputEvent};
use crate::layout::{offset, INPUT_QUEUE_SLOTS};
use crate::region::SharedRegion;

/// Number of events the ring can hold at once.
pub const INPUT_QUEUE_CAPACITY: usize = INPUT_QUEUE_SLOTS - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Full,
    /// `head` or `tail` holds an out-of-range index.
    Corrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The queue is empty.
    Empty,
    /// `head` or `tail` holds an out-of-range index.
    Corrupt,
}

#[derive(Clone, Copy)]
pub struct InputRing<'a> {
    region: &'a SharedRegion,
}

impl SharedRegion {
    pub fn input_ring(&self) -> InputRing<'_> {
        InputRing { region: self }
    }
}

impl<'a> InputRing<'a> {
    fn indices(&self, order_head: Ordering, order_tail: Ordering) -> Option<(u32, u32)> {
        let head = self.region.load(offset::INPUT_QUEUE_HEAD, order_head);
        let tail = self.region.load(offset::INPUT_QUEUE_TAIL, order_tail);
        let slots = INPUT_QUEUE_SLOTS as u32;
        (head < slots && tail < slots).then_some((head, tail))
    }

    pub fn len(&self) -> usize {
        match self.indices(Ordering::Acquire, Ordering::Acquire) {
            Some((head, tail)) => {
                (tail as usize + INPUT_QUEUE_SLOTS - head as usize) % INPUT_QUEUE_SLOTS
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer (host) side.
    pub fn try_push(&self, event: &InputEvent) -> Result<(), PushError> {
        let (head, tail) = self
            .indices(Ordering::Acquire, Ordering::Relaxed)
            .ok_or(PushError::Corrupt)?;
        let next = (tail + 1) % INPUT_QUEUE_SLOTS as u32;
        if next == head {
            return Err(PushError::Full);
        }

        let words = input::to_words(&input::encode(event));
        self.region.store_slot(tail as usize, &words);
        self.region
            .store(offset::INPUT_QUEUE_TAIL, next, Ordering::Release);
        Ok(())
    }

    /// Consumer (worker) side.
    pub fn try_pop(&self) -> Result<InputEvent, PopError> {
        let (head, tail) = self
            .indices(Ordering::Relaxed, Ordering::Acquire)
            .ok_or(PopError::Corrupt)?;
        if head == tail {
            return Err(PopError::Empty);
        }

        let words = self.region.load_slot(head as usize);
        let next = (head + 1) % INPUT_QUEUE_SLOTS as u32;
        self.region
            .store(offset::INPUT_QUEUE_HEAD, next, Ordering::Release);
        Ok(input::decode(&input::from_words(&words)))
    }

    /// Consumer side recovery after [`PopError::Corrupt`]: drop everything queued by moving
    /// `head` onto `tail`. Returns `false` if `tail` itself is out of range, in which case the
    /// ring stays unusable until the producer repairs it.
    pub fn discard_pending(&self) -> bool {
        let tail = self.region.load(offset::INPUT_QUEUE_TAIL, Ordering::Acquire);
        if tail as usize >= INPUT_QUEUE_SLOTS {
            return false;
        }
        self.region
            .store(offset::INPUT_QUEUE_HEAD, tail, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Modifiers, PointerKind};

    fn ev(i: i32) -> InputEvent {
        InputEvent::pointer(PointerKind::Move, i, -i, Modifiers::empty())
    }

    #[test]
    fn fifo_and_wraparound() {
        let region = SharedRegion::heap("t", 1, 1).unwrap();
        let ring = region.input_ring();
        for round in 0..3 {
            for i in 0..100 {
                ring.try_push(&ev(round * 1000 + i)).unwrap();
            }
            assert_eq!(ring.len(), 100);
            for i in 0..100 {
                assert_eq!(ring.try_pop(), Ok(ev(round * 1000 + i)));
            }
            assert_eq!(ring.try_pop(), Err(PopError::Empty));
        }
    }

    #[test]
    fn full_ring_rejects_newest() {
        let region = SharedRegion::heap("t", 1, 1).unwrap();
        let ring = region.input_ring();
        for i in 0..INPUT_QUEUE_CAPACITY as i32 {
            ring.try_push(&ev(i)).unwrap();
        }
        assert_eq!(ring.try_push(&ev(999)), Err(PushError::Full));
        assert_eq!(ring.len(), INPUT_QUEUE_CAPACITY);
        assert_eq!(ring.try_pop(), Ok(ev(0)));
        ring.try_push(&ev(999)).unwrap();
    }

    #[test]
    fn corrupt_indices_are_reported_and_recoverable() {
        let region = SharedRegion::heap("t", 1, 1).unwrap();
        let ring = region.input_ring();
        ring.try_push(&ev(1)).unwrap();
        region.store(offset::INPUT_QUEUE_HEAD, 500, Ordering::Relaxed);
        assert_eq!(ring.try_pop(), Err(PopError::Corrupt));
        assert_eq!(ring.try_push(&ev(2)), Err(PushError::Corrupt));
        assert!(ring.discard_pending());
        assert_eq!(ring.try_pop(), Err(PopError::Empty));
        ring.try_push(&ev(3)).unwrap();
        assert_eq!(ring.try_pop(), Ok(ev(3)));
    }

    #[test]
    fn slot_bytes_land_at_queue_offset() {
        let region = SharedRegion::heap("t", 1, 1).unwrap();
        let event = ev(7);
        region.input_ring().try_push(&event).unwrap();
        let bytes = region.to_bytes();
        assert_eq!(&bytes[128..144], &input::encode(&event));
        assert_eq!(&bytes[36..40], &1u32.to_le_bytes());
    }
}
