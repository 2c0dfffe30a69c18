use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::Serialize;

/// Session counters. Cheap to clone; all clones share the same counters.
#[derive(Clone, Default)]
pub struct Diagnostics {
    inner: Arc<DiagnosticsInner>,
}

#[derive(Default)]
struct DiagnosticsInner {
    // Frames
    frames_rendered: AtomicU64,
    frames_failed: AtomicU64,
    frames_skipped_sleeping: AtomicU64,

    // Input
    input_submitted: AtomicU64,
    input_dropped: AtomicU64,
    input_applied: AtomicU64,

    // Commands
    commands_sent: AtomicU64,
    commands_rejected_busy: AtomicU64,
    commands_applied: AtomicU64,
    commands_ignored: AtomicU64,

    torn_read_retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub frames_rendered: u64,
    pub frames_failed: u64,
    pub frames_skipped_sleeping: u64,
    pub input_submitted: u64,
    pub input_dropped: u64,
    pub input_applied: u64,
    pub commands_sent: u64,
    pub commands_rejected_busy: u64,
    pub commands_applied: u64,
    pub commands_ignored: u64,
    pub torn_read_retries: u64,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_rendered(&self) {
        self.inner.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_failed(&self) {
        self.inner.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_skipped_sleeping(&self) {
        self.inner
            .frames_skipped_sleeping
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn input_submitted(&self) {
        self.inner.input_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total number of dropped events including this one.
    pub fn input_dropped(&self) -> u64 {
        self.inner.input_dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn input_applied(&self) {
        self.inner.input_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.inner.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_rejected_busy(&self) {
        self.inner
            .commands_rejected_busy
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_applied(&self) {
        self.inner.commands_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_ignored(&self) {
        self.inner.commands_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn torn_read_retries(&self, retries: u32) {
        if retries > 0 {
            self.inner
                .torn_read_retries
                .fetch_add(u64::from(retries), Ordering::Relaxed);
        }
    }

    pub fn dropped_input_events(&self) -> u64 {
        self.inner.input_dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let i = &self.inner;
        DiagnosticsSnapshot {
            frames_rendered: i.frames_rendered.load(Ordering::Relaxed),
            frames_failed: i.frames_failed.load(Ordering::Relaxed),
            frames_skipped_sleeping: i.frames_skipped_sleeping.load(Ordering::Relaxed),
            input_submitted: i.input_submitted.load(Ordering::Relaxed),
            input_dropped: i.input_dropped.load(Ordering::Relaxed),
            input_applied: i.input_applied.load(Ordering::Relaxed),
            commands_sent: i.commands_sent.load(Ordering::Relaxed),
            commands_rejected_busy: i.commands_rejected_busy.load(Ordering::Relaxed),
            commands_applied: i.commands_applied.load(Ordering::Relaxed),
            commands_ignored: i.commands_ignored.load(Ordering::Relaxed),
            torn_read_retries: i.torn_read_retries.load(Ordering::Relaxed),
        }
    }
}

/// Log the first drop and then every 64th so a flooded queue doesn't flood the log too.
pub(crate) fn should_log_drop(total_dropped: u64) -> bool {
    total_dropped == 1 || total_dropped % 64 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let a = Diagnostics::new();
        let b = a.clone();
        a.input_submitted();
        assert_eq!(b.input_dropped(), 1);
        b.torn_read_retries(0);
        b.torn_read_retries(3);
        let snap = a.snapshot();
        assert_eq!(snap.input_submitted, 1);
        assert_eq!(snap.input_dropped, 1);
        assert_eq!(snap.torn_read_retries, 3);
    }

    #[test]
    fn drop_logging_is_rate_limited() {
        let logged: Vec<u64> = (1..=200).filter(|n| should_log_drop(*n)).collect();
        assert_eq!(logged, vec![1, 64, 128, 192]);
    }

    #[test]
    fn snapshot_serializes_with_field_names() {
        let d = Diagnostics::new();
        d.frame_rendered();
        d.command_rejected_busy();
        let json = serde_json::to_value(d.snapshot()).unwrap();
        assert_eq!(json["frames_rendered"], 1);
        assert_eq!(json["commands_rejected_busy"], 1);
        assert_eq!(json["input_dropped"], 0);
    }
}
