//! In-process proxy: the kernel runs on the caller's thread inside `tick()`.

use std::collections::VecDeque;
use std::time::Instant;

use mmos_ipc::{Command, InputEvent, INPUT_QUEUE_CAPACITY};

use crate::config::RuntimeConfig;
use crate::driver::{CommandEffect, FrameOutcome, KernelDriver};
use crate::error::{Result, RuntimeError};
use crate::kernel::Kernel;
use crate::metrics::{should_log_drop, Diagnostics};
use crate::modifiers::ModifierTracker;
use crate::proxy::{
    CommandRequest, KernelProxy, ProxyStatus, ShutdownOutcome, ShutdownReport, Submitted,
};

/// Drives a kernel directly. Input and commands are queued exactly like the shared-region path
/// (bounded queue, one pending command applied at the start of the next frame) so both proxies
/// behave the same from the caller's side.
pub struct LocalKernel {
    driver: KernelDriver,
    session: String,
    queue: VecDeque<InputEvent>,
    pending: Option<Command>,
    front: Vec<u32>,
    frame_count: u32,
    diagnostics: Diagnostics,
    modifiers: ModifierTracker,
    report: Option<ShutdownReport>,
}

impl LocalKernel {
    pub fn start(
        kernel: Box<dyn Kernel>,
        session: &str,
        config: &RuntimeConfig,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        config.validate()?;
        let mut driver = KernelDriver::new(kernel, session, config, diagnostics.clone());
        if let Err(err) = driver.init() {
            tracing::error!(session, "kernel initialisation failed: {err}");
            return Err(RuntimeError::StartupFailed(err.to_string()));
        }
        tracing::info!(session, width = config.width, height = config.height, "local kernel started");

        let front = driver.frame().to_vec();
        Ok(Self {
            driver,
            session: session.to_string(),
            queue: VecDeque::with_capacity(INPUT_QUEUE_CAPACITY),
            pending: None,
            front,
            frame_count: 0,
            diagnostics,
            modifiers: ModifierTracker::new(),
            report: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.report.is_none()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(RuntimeError::NotRunning)
        }
    }

    fn stop(&mut self, outcome: ShutdownOutcome, started: Instant) -> ShutdownReport {
        let clean = self.driver.shutdown();
        let outcome = if clean {
            outcome
        } else {
            ShutdownOutcome::Abnormal
        };
        let report = ShutdownReport {
            outcome,
            elapsed: started.elapsed(),
        };
        tracing::info!(session = %self.session, ?outcome, elapsed = ?report.elapsed, "local kernel stopped");
        self.queue.clear();
        self.pending = None;
        self.report = Some(report);
        report
    }
}

impl KernelProxy for LocalKernel {
    fn width(&self) -> u32 {
        self.driver.width()
    }

    fn height(&self) -> u32 {
        self.driver.height()
    }

    fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn tick(&mut self) -> Result<()> {
        self.ensure_running()?;

        while let Some(event) = self.queue.pop_front() {
            self.driver.apply_input(&event);
        }

        if let Some(command) = self.pending.take() {
            match self.driver.apply_command(&command.to_pending()) {
                CommandEffect::Shutdown => {
                    self.stop(ShutdownOutcome::Clean, Instant::now());
                    return Ok(());
                }
                CommandEffect::Resized { .. } => {
                    self.front = self.driver.frame().to_vec();
                }
                CommandEffect::Applied | CommandEffect::Ignored => {}
            }
        }

        match self.driver.render() {
            FrameOutcome::Rendered => {
                self.front.copy_from_slice(self.driver.frame());
                self.frame_count = self.frame_count.wrapping_add(1);
            }
            FrameOutcome::SkippedSleeping | FrameOutcome::Failed { escalate: false } => {}
            FrameOutcome::Failed { escalate: true } => {
                self.stop(ShutdownOutcome::Abnormal, Instant::now());
            }
        }
        Ok(())
    }

    fn current_frame(&self) -> &[u32] {
        &self.front
    }

    fn is_sleeping(&self) -> bool {
        self.driver.is_sleeping()
    }

    fn submit_input(&mut self, event: InputEvent) -> Result<Submitted> {
        self.ensure_running()?;
        self.diagnostics.input_submitted();
        if self.queue.len() >= INPUT_QUEUE_CAPACITY {
            let dropped = self.diagnostics.input_dropped();
            if should_log_drop(dropped) {
                tracing::warn!(session = %self.session, dropped, "input queue full; dropping event");
            }
            return Ok(Submitted::Dropped);
        }
        self.queue.push_back(event);
        Ok(Submitted::Queued)
    }

    fn request_command(&mut self, command: Command) -> Result<CommandRequest> {
        self.ensure_running()?;
        if let Some(pending) = &self.pending {
            tracing::warn!(session = %self.session, ?command, ?pending, "command slot busy; ignoring");
            self.diagnostics.command_rejected_busy();
            return Ok(CommandRequest::Busy);
        }
        tracing::debug!(session = %self.session, ?command, "command queued");
        self.diagnostics.command_sent();
        self.pending = Some(command);
        Ok(CommandRequest::Accepted)
    }

    fn status(&self) -> ProxyStatus {
        let kernel = self.driver.status();
        ProxyStatus {
            frame_rate: self.driver.frame_rate(),
            sleeping: self.driver.is_sleeping(),
            debug_mode: kernel.debug_mode,
            text_input_focus: kernel.text_input_focus,
            top_closable_layer: kernel.top_closable_layer,
            server_ready: self.is_running(),
            client_connected: self.is_running(),
        }
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn modifier_tracker(&mut self) -> &mut ModifierTracker {
        &mut self.modifiers
    }

    fn shutdown(&mut self) -> ShutdownReport {
        match self.report {
            Some(report) => report,
            None => self.stop(ShutdownOutcome::Clean, Instant::now()),
        }
    }
}

impl Drop for LocalKernel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
