//! Boundary to the simulated device kernel.
//!
//! The application framework (screens, navigation, services) lives behind [`Kernel`]; the
//! runtime only drives it: init, per-frame update/render, input, and coarse control hooks.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use mmos_ipc::{InputEvent, Layer};

use crate::error::KernelError;

/// Kernel-reported state mirrored into the shared header after every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStatus {
    pub debug_mode: bool,
    pub text_input_focus: bool,
    pub top_closable_layer: Option<Layer>,
}

pub trait Kernel: Send {
    /// Called once on the worker before the first frame.
    fn init(&mut self, width: u32, height: u32) -> Result<(), KernelError>;

    /// Advance simulated time by one frame.
    fn update(&mut self) -> Result<(), KernelError>;

    /// Draw the current state into `frame` (`width * height` packed ARGB pixels, row-major).
    fn render(&mut self, frame: &mut [u32]) -> Result<(), KernelError>;

    fn handle_input(&mut self, event: &InputEvent) -> Result<(), KernelError>;

    fn sleep(&mut self) {}

    fn wake(&mut self) {}

    fn go_home(&mut self) {}

    fn home_button(&mut self) {}

    fn add_layer(&mut self, _layer: Layer) {}

    fn remove_layer(&mut self, _layer: Layer) {}

    fn set_frame_rate(&mut self, _fps: u32) {}

    fn resize(&mut self, _width: u32, _height: u32) -> Result<(), KernelError> {
        Ok(())
    }

    fn status(&self) -> KernelStatus {
        KernelStatus::default()
    }

    fn shutdown(&mut self) {}
}

/// Run `f`, turning a panic into [`KernelError::Panicked`].
pub fn guarded<T>(f: impl FnOnce() -> Result<T, KernelError>) -> Result<T, KernelError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(payload) => Err(KernelError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
