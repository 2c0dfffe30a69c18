#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mmos_ipc::InputEvent;
use mmos_runtime::{DemoKernel, Kernel, KernelError, KernelStatus, Pacing, RuntimeConfig};

pub fn host_driven(width: u32, height: u32) -> RuntimeConfig {
    RuntimeConfig {
        width,
        height,
        pacing: Pacing::HostDriven,
        startup_timeout: Duration::from_secs(5),
        shutdown_timeout: Duration::from_secs(2),
        tick_timeout: Duration::from_secs(2),
        connect_retry_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Wraps the demo kernel with fault injection.
#[derive(Default)]
pub struct FaultyKernel {
    pub inner: DemoKernel,
    pub fail_init: bool,
    /// Fail every frame once this many frames have rendered.
    pub fail_after: Option<u32>,
    /// While set, `render` blocks for `stall_for`.
    pub stall: Option<Arc<AtomicBool>>,
    pub stall_for: Duration,
    pub rendered: Arc<AtomicU32>,
    pub shut_down: Arc<AtomicBool>,
}

impl Kernel for FaultyKernel {
    fn init(&mut self, width: u32, height: u32) -> Result<(), KernelError> {
        if self.fail_init {
            return Err(KernelError::Failed("no display".into()));
        }
        self.inner.init(width, height)
    }

    fn update(&mut self) -> Result<(), KernelError> {
        self.inner.update()
    }

    fn render(&mut self, frame: &mut [u32]) -> Result<(), KernelError> {
        if let Some(stall) = &self.stall {
            if stall.load(Ordering::SeqCst) {
                std::thread::sleep(self.stall_for);
            }
        }
        if let Some(limit) = self.fail_after {
            if self.rendered.load(Ordering::SeqCst) >= limit {
                panic!("renderer exploded");
            }
        }
        self.inner.render(frame)?;
        self.rendered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_input(&mut self, event: &InputEvent) -> Result<(), KernelError> {
        self.inner.handle_input(event)
    }

    fn sleep(&mut self) {
        self.inner.sleep()
    }

    fn wake(&mut self) {
        self.inner.wake()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), KernelError> {
        self.inner.resize(width, height)
    }

    fn status(&self) -> KernelStatus {
        self.inner.status()
    }

    fn shutdown(&mut self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}
