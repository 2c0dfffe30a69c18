//! Host-side modifier key tracking.
//!
//! Hosts report raw key codes; the tracker folds Shift/Ctrl/Alt/Meta presses into the mask that
//! is stamped on every pointer and key event sent to the kernel.

use mmos_ipc::input::{KeyKind, Modifiers};

pub mod key_code {
    pub const SHIFT: i32 = 16;
    pub const CTRL: i32 = 17;
    pub const ALT: i32 = 18;
    pub const META: i32 = 157;
    /// Alternate Meta/Windows key code some hosts report.
    pub const META_ALT: i32 = 524;
}

pub fn modifier_for_key(code: i32) -> Option<Modifiers> {
    match code {
        key_code::SHIFT => Some(Modifiers::SHIFT),
        key_code::CTRL => Some(Modifiers::CTRL),
        key_code::ALT => Some(Modifiers::ALT),
        key_code::META | key_code::META_ALT => Some(Modifiers::META),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierTracker {
    held: Modifiers,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, kind: KeyKind, code: i32) {
        if let Some(m) = modifier_for_key(code) {
            self.held.set(m, kind == KeyKind::Down);
        }
    }

    pub fn current(&self) -> Modifiers {
        self.held
    }

    pub fn clear(&mut self) {
        self.held = Modifiers::empty();
    }
}
