//! Fixed-size (16 byte) input event codec.
//!
//! Pointer events:
//!
//! ```text
//! 0   type        i32
//! 4   x           i16
//! 6   y           i16
//! 8   button      i16
//! 10  modifiers   u8
//! 11  reserved    u8
//! 12  payload     f32   (wheel delta, 0.0 otherwise)
//! ```
//!
//! Key events reuse the same 16 bytes: `x`/`y` carry the high/low halves of the key code and
//! `button` carries the UTF-16 key character. The reinterpretation is part of the wire format
//! and must be preserved bit-for-bit.

use bitflags::bitflags;

use crate::layout::INPUT_EVENT_BYTES;

bitflags! {
    /// Modifier keys held while the event was produced.
    ///
    /// Unknown bits are retained so the full byte survives a round trip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0x01;
        const CTRL = 0x02;
        const ALT = 0x04;
        const META = 0x08;
    }
}

pub mod event_type {
    pub const POINTER_DOWN: u32 = 1;
    pub const POINTER_UP: u32 = 2;
    pub const POINTER_DRAG: u32 = 3;
    pub const POINTER_MOVE: u32 = 4;
    pub const WHEEL: u32 = 5;
    pub const KEY_DOWN: u32 = 6;
    pub const KEY_UP: u32 = 7;
    /// Reserved for gestures; currently decoded as a no-op.
    pub const GESTURE: u32 = 8;
}

/// Primary button as reported for press/release/drag events.
pub const BUTTON_PRIMARY: i16 = 1;
pub const BUTTON_NONE: i16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub x: i16,
    pub y: i16,
    pub button: i16,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: i32,
    /// UTF-16 code unit of the typed character (0 for non-printing keys).
    pub key_char: u16,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Down,
    Up,
    Drag,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerEvent),
    PointerUp(PointerEvent),
    PointerDrag(PointerEvent),
    PointerMove(PointerEvent),
    Wheel { pointer: PointerEvent, delta: f32 },
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    /// Produced when decoding a slot with an unrecognised type tag.
    Noop { tag: u32 },
}

impl InputEvent {
    /// Build a pointer event from host coordinates, saturating them to the wire's `i16` range.
    pub fn pointer(kind: PointerKind, x: i32, y: i32, modifiers: Modifiers) -> Self {
        let button = match kind {
            PointerKind::Move => BUTTON_NONE,
            _ => BUTTON_PRIMARY,
        };
        let pointer = PointerEvent {
            x: saturate_i16(x),
            y: saturate_i16(y),
            button,
            modifiers,
        };
        match kind {
            PointerKind::Down => InputEvent::PointerDown(pointer),
            PointerKind::Up => InputEvent::PointerUp(pointer),
            PointerKind::Drag => InputEvent::PointerDrag(pointer),
            PointerKind::Move => InputEvent::PointerMove(pointer),
        }
    }

    pub fn wheel(x: i32, y: i32, delta: f32, modifiers: Modifiers) -> Self {
        InputEvent::Wheel {
            pointer: PointerEvent {
                x: saturate_i16(x),
                y: saturate_i16(y),
                button: BUTTON_NONE,
                modifiers,
            },
            delta,
        }
    }

    /// Build a key event. Characters outside the BMP are sent as U+FFFD.
    pub fn key(kind: KeyKind, key_char: char, key_code: i32, modifiers: Modifiers) -> Self {
        let key = KeyEvent {
            key_code,
            key_char: u16::try_from(u32::from(key_char)).unwrap_or(0xFFFD),
            modifiers,
        };
        match kind {
            KeyKind::Down => InputEvent::KeyDown(key),
            KeyKind::Up => InputEvent::KeyUp(key),
        }
    }

    pub fn tag(&self) -> u32 {
        match self {
            InputEvent::PointerDown(_) => event_type::POINTER_DOWN,
            InputEvent::PointerUp(_) => event_type::POINTER_UP,
            InputEvent::PointerDrag(_) => event_type::POINTER_DRAG,
            InputEvent::PointerMove(_) => event_type::POINTER_MOVE,
            InputEvent::Wheel { .. } => event_type::WHEEL,
            InputEvent::KeyDown(_) => event_type::KEY_DOWN,
            InputEvent::KeyUp(_) => event_type::KEY_UP,
            InputEvent::Noop { tag } => *tag,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            InputEvent::PointerDown(p)
            | InputEvent::PointerUp(p)
            | InputEvent::PointerDrag(p)
            | InputEvent::PointerMove(p)
            | InputEvent::Wheel { pointer: p, .. } => p.modifiers,
            InputEvent::KeyDown(k) | InputEvent::KeyUp(k) => k.modifiers,
            InputEvent::Noop { .. } => Modifiers::empty(),
        }
    }
}

fn saturate_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encode one event into its 16-byte wire form.
pub fn encode(event: &InputEvent) -> [u8; INPUT_EVENT_BYTES] {
    let mut out = [0u8; INPUT_EVENT_BYTES];
    out[0..4].copy_from_slice(&event.tag().to_le_bytes());

    let (a, b, c, modifiers, payload) = match event {
        InputEvent::PointerDown(p)
        | InputEvent::PointerUp(p)
        | InputEvent::PointerDrag(p)
        | InputEvent::PointerMove(p) => (p.x, p.y, p.button, p.modifiers, 0.0f32),
        InputEvent::Wheel { pointer, delta } => {
            (pointer.x, pointer.y, pointer.button, pointer.modifiers, *delta)
        }
        InputEvent::KeyDown(k) | InputEvent::KeyUp(k) => (
            (k.key_code >> 16) as i16,
            k.key_code as i16,
            k.key_char as i16,
            k.modifiers,
            0.0,
        ),
        InputEvent::Noop { .. } => (0, 0, 0, Modifiers::empty(), 0.0),
    };

    out[4..6].copy_from_slice(&a.to_le_bytes());
    out[6..8].copy_from_slice(&b.to_le_bytes());
    out[8..10].copy_from_slice(&c.to_le_bytes());
    out[10] = modifiers.bits();
    out[11] = 0;
    out[12..16].copy_from_slice(&payload.to_le_bytes());
    out
}

/// Decode one 16-byte slot. Unknown type tags become [`InputEvent::Noop`] rather than an error
/// so a consumer can always make progress through the queue.
pub fn decode(bytes: &[u8; INPUT_EVENT_BYTES]) -> InputEvent {
    let tag = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let a = i16::from_le_bytes([bytes[4], bytes[5]]);
    let b = i16::from_le_bytes([bytes[6], bytes[7]]);
    let c = i16::from_le_bytes([bytes[8], bytes[9]]);
    let modifiers = Modifiers::from_bits_retain(bytes[10]);
    let payload = f32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let pointer = PointerEvent {
        x: a,
        y: b,
        button: c,
        modifiers,
    };
    let key = KeyEvent {
        key_code: ((a as u16 as i32) << 16) | (b as u16 as i32),
        key_char: c as u16,
        modifiers,
    };

    match tag {
        event_type::POINTER_DOWN => InputEvent::PointerDown(pointer),
        event_type::POINTER_UP => InputEvent::PointerUp(pointer),
        event_type::POINTER_DRAG => InputEvent::PointerDrag(pointer),
        event_type::POINTER_MOVE => InputEvent::PointerMove(pointer),
        event_type::WHEEL => InputEvent::Wheel {
            pointer,
            delta: payload,
        },
        event_type::KEY_DOWN => InputEvent::KeyDown(key),
        event_type::KEY_UP => InputEvent::KeyUp(key),
        _ => InputEvent::Noop { tag },
    }
}

/// Encode `event` into `buf[offset..offset + 16]`. Returns `None` if the slice is too short.
pub fn encode_at(event: &InputEvent, buf: &mut [u8], offset: usize) -> Option<()> {
    let end = offset.checked_add(INPUT_EVENT_BYTES)?;
    buf.get_mut(offset..end)?.copy_from_slice(&encode(event));
    Some(())
}

/// Decode the slot at `buf[offset..offset + 16]`. Returns `None` if the slice is too short.
pub fn decode_at(buf: &[u8], offset: usize) -> Option<InputEvent> {
    let end = offset.checked_add(INPUT_EVENT_BYTES)?;
    let slot: &[u8; INPUT_EVENT_BYTES] = buf.get(offset..end)?.try_into().ok()?;
    Some(decode(slot))
}

pub(crate) fn to_words(bytes: &[u8; INPUT_EVENT_BYTES]) -> [u32; INPUT_EVENT_BYTES / 4] {
    let mut words = [0u32; INPUT_EVENT_BYTES / 4];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

pub(crate) fn from_words(words: &[u32; INPUT_EVENT_BYTES / 4]) -> [u8; INPUT_EVENT_BYTES] {
    let mut bytes = [0u8; INPUT_EVENT_BYTES];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    bytes
}
