//! The interface the host drives a kernel through, whichever side of the boundary it runs on.

use std::time::Duration;

use mmos_ipc::{Command, InputEvent, KeyKind, Layer, PointerKind};

use crate::error::Result;
use crate::metrics::Diagnostics;
use crate::modifiers::ModifierTracker;

/// Result of handing an input event to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// The queue was full; the event was discarded and counted.
    Dropped,
}

/// Result of a command request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRequest {
    Accepted,
    /// A previous command has not been consumed yet; this one was discarded.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker acknowledged and exited within the timeout.
    Clean,
    /// Resources were reclaimed forcibly, or the kernel had already stopped on its own.
    Abnormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.outcome == ShutdownOutcome::Clean
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStatus {
    pub frame_rate: u32,
    pub sleeping: bool,
    pub debug_mode: bool,
    pub text_input_focus: bool,
    pub top_closable_layer: Option<Layer>,
    pub server_ready: bool,
    pub client_connected: bool,
}

/// Host-facing kernel handle. Implemented by [`crate::LocalKernel`] (in-process) and
/// [`crate::RemoteKernel`] (through a shared region).
///
/// Apart from [`tick`](Self::tick) and [`shutdown`](Self::shutdown), every call returns
/// without waiting on the kernel.
pub trait KernelProxy: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Number of frames published so far. Wraps at `u32::MAX`; compare for equality only.
    fn frame_count(&self) -> u32;

    /// Advance the kernel by one frame.
    ///
    /// [`LocalKernel`](crate::LocalKernel) and a worker under [`Pacing::HostDriven`] render
    /// exactly one frame per call (none while sleeping), so the frame count moves by one per
    /// `tick()`. Under [`Pacing::FreeRunning`] the worker renders on its own schedule and this only
    /// picks up the newest published frame, which may be several frames ahead or unchanged.
    ///
    /// [`Pacing::HostDriven`]: crate::Pacing::HostDriven
    /// [`Pacing::FreeRunning`]: crate::Pacing::FreeRunning
    fn tick(&mut self) -> Result<()>;

    /// The most recent complete frame, `width * height` ARGB pixels.
    fn current_frame(&self) -> &[u32];

    fn is_sleeping(&self) -> bool;

    fn submit_input(&mut self, event: InputEvent) -> Result<Submitted>;

    fn request_command(&mut self, command: Command) -> Result<CommandRequest>;

    fn status(&self) -> ProxyStatus;

    fn diagnostics(&self) -> &Diagnostics;

    fn modifier_tracker(&mut self) -> &mut ModifierTracker;

    /// Stop the kernel and release its resources. Idempotent; later calls return the first report.
    fn shutdown(&mut self) -> ShutdownReport;

    fn sleep(&mut self) -> Result<CommandRequest> {
        self.request_command(Command::Sleep)
    }

    fn wake(&mut self) -> Result<CommandRequest> {
        self.request_command(Command::Wake)
    }

    fn submit_pointer_event(&mut self, kind: PointerKind, x: i32, y: i32) -> Result<Submitted> {
        let modifiers = self.modifier_tracker().current();
        self.submit_input(InputEvent::pointer(kind, x, y, modifiers))
    }

    fn submit_wheel_event(&mut self, x: i32, y: i32, delta: f32) -> Result<Submitted> {
        let modifiers = self.modifier_tracker().current();
        self.submit_input(InputEvent::wheel(x, y, delta, modifiers))
    }

    fn submit_key_event(&mut self, kind: KeyKind, key_char: char, key_code: i32) -> Result<Submitted> {
        let tracker = self.modifier_tracker();
        tracker.observe(kind, key_code);
        let modifiers = tracker.current();
        self.submit_input(InputEvent::key(kind, key_char, key_code, modifiers))
    }
}
