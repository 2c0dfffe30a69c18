//! Shared-region proxy: the kernel runs on a worker thread or in a worker process and is reached
//! only through the region's header, command slot, input ring and framebuffer.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mmos_ipc::state::tick_served;
use mmos_ipc::{
    Command, FrameReader, InputEvent, IpcError, Layer, PushError, Refresh, RegionNamespace,
    SharedRegion, StateFlags,
};

use crate::config::{Pacing, RuntimeConfig};
use crate::error::{Result, RuntimeError};
use crate::launcher::ProcessLauncher;
use crate::metrics::{should_log_drop, Diagnostics};
use crate::modifiers::ModifierTracker;
use crate::proxy::{
    CommandRequest, KernelProxy, ProxyStatus, ShutdownOutcome, ShutdownReport, Submitted,
};
use crate::worker::WorkerHandle;

/// What the proxy has to reclaim on shutdown.
#[derive(Debug)]
pub(crate) enum WorkerLink {
    Thread(WorkerHandle),
    Process(ProcessLauncher),
    /// A worker someone else started; nothing to reclaim beyond the handshake.
    External,
}

impl WorkerLink {
    /// Wait up to `timeout` for the worker to go away. Returns `true` if it exited on its own.
    fn reclaim(&mut self, timeout: Duration) -> bool {
        match self {
            WorkerLink::Thread(handle) => handle.join_timeout(timeout),
            WorkerLink::Process(launcher) => launcher.stop(timeout),
            WorkerLink::External => true,
        }
    }
}

pub struct RemoteKernel {
    session: String,
    name: String,
    namespace: Arc<dyn RegionNamespace>,
    region: Arc<SharedRegion>,
    reader: FrameReader,
    config: RuntimeConfig,
    diagnostics: Diagnostics,
    modifiers: ModifierTracker,
    link: WorkerLink,
    shutdown_sent: bool,
    report: Option<ShutdownReport>,
}

impl std::fmt::Debug for RemoteKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKernel")
            .field("session", &self.session)
            .field("region", &self.region)
            .field("link", &self.link)
            .field("report", &self.report)
            .finish()
    }
}

impl RemoteKernel {
    /// Wrap a region that has already been attached and found ready.
    pub(crate) fn new(
        session: &str,
        name: &str,
        namespace: Arc<dyn RegionNamespace>,
        region: Arc<SharedRegion>,
        config: RuntimeConfig,
        diagnostics: Diagnostics,
        link: WorkerLink,
    ) -> Self {
        region.set_flag(StateFlags::CLIENT_CONNECTED, true);
        let mut reader = FrameReader::new(region.pixel_count());
        diagnostics.torn_read_retries(refresh_retries(reader.refresh(&region)));
        tracing::info!(
            session,
            region = name,
            width = region.width(),
            height = region.height(),
            pacing = %config.pacing,
            "attached to worker"
        );
        Self {
            session: session.to_string(),
            name: name.to_string(),
            namespace,
            region,
            reader,
            config,
            diagnostics,
            modifiers: ModifierTracker::new(),
            link,
            shutdown_sent: false,
            report: None,
        }
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    pub fn is_running(&self) -> bool {
        self.report.is_none() && self.region.has_flag(StateFlags::SERVER_READY)
    }

    /// Re-attach if the worker replaced the region (resize).
    fn follow_resize(&mut self) -> Result<()> {
        if !self.region.is_retired() {
            return Ok(());
        }
        match self.namespace.attach(&self.name) {
            Ok(region) => {
                region.set_flag(StateFlags::CLIENT_CONNECTED, true);
                tracing::info!(
                    session = %self.session,
                    width = region.width(),
                    height = region.height(),
                    "re-attached to resized region"
                );
                self.reader.reset(region.pixel_count());
                self.region = region;
                Ok(())
            }
            Err(IpcError::NotFound(_) | IpcError::Retired(_)) => Err(RuntimeError::NotRunning),
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_running(&mut self) -> Result<()> {
        if self.report.is_some() {
            return Err(RuntimeError::NotRunning);
        }
        self.follow_resize()?;
        if !self.region.has_flag(StateFlags::SERVER_READY) {
            return Err(RuntimeError::NotRunning);
        }
        Ok(())
    }

    fn wait_for_ack(&self, req: u32) -> Result<()> {
        let deadline = Instant::now() + self.config.tick_timeout;
        let mut spins = 0u32;
        loop {
            if tick_served(self.region.tick_ack(), req) {
                return Ok(());
            }
            if !self.region.has_flag(StateFlags::SERVER_READY) {
                // The worker acknowledges before it clears the flag.
                if tick_served(self.region.tick_ack(), req) {
                    return Ok(());
                }
                return Err(RuntimeError::NotRunning);
            }
            if Instant::now() >= deadline {
                tracing::warn!(session = %self.session, req, "tick not acknowledged in time");
                return Err(RuntimeError::TickTimeout(self.config.tick_timeout));
            }
            if spins < 64 {
                spins += 1;
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_micros(50));
            }
        }
    }

    fn refresh_frame(&mut self) {
        let refresh = self.reader.refresh(&self.region);
        if let Refresh::Torn { retries } = refresh {
            tracing::debug!(session = %self.session, retries, "frame read raced a publish; keeping previous frame");
        }
        self.diagnostics.torn_read_retries(refresh_retries(refresh));
    }
}

fn refresh_retries(refresh: Refresh) -> u32 {
    match refresh {
        Refresh::Unchanged => 0,
        Refresh::Updated { retries, .. } | Refresh::Torn { retries } => retries,
    }
}

impl KernelProxy for RemoteKernel {
    fn width(&self) -> u32 {
        self.region.width()
    }

    fn height(&self) -> u32 {
        self.region.height()
    }

    fn frame_count(&self) -> u32 {
        self.reader.frame_count().unwrap_or(0)
    }

    fn tick(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.config.pacing == Pacing::HostDriven {
            let req = self.region.bump_tick_request();
            self.wait_for_ack(req)?;
            self.follow_resize()?;
        }
        self.refresh_frame();
        Ok(())
    }

    fn current_frame(&self) -> &[u32] {
        self.reader.pixels()
    }

    fn is_sleeping(&self) -> bool {
        self.region.has_flag(StateFlags::SLEEPING)
    }

    fn submit_input(&mut self, event: InputEvent) -> Result<Submitted> {
        self.ensure_running()?;
        self.diagnostics.input_submitted();
        match self.region.input_ring().try_push(&event) {
            Ok(()) => Ok(Submitted::Queued),
            Err(err) => {
                let dropped = self.diagnostics.input_dropped();
                if err == PushError::Corrupt {
                    tracing::warn!(session = %self.session, "input ring indices corrupt; dropping event");
                } else if should_log_drop(dropped) {
                    tracing::warn!(session = %self.session, dropped, "input queue full; dropping event");
                }
                Ok(Submitted::Dropped)
            }
        }
    }

    fn request_command(&mut self, command: Command) -> Result<CommandRequest> {
        self.ensure_running()?;
        match self.region.try_set_command(&command.to_pending()) {
            Ok(()) => {
                tracing::debug!(session = %self.session, ?command, "command sent");
                self.diagnostics.command_sent();
                if command == Command::Shutdown {
                    self.shutdown_sent = true;
                }
                Ok(CommandRequest::Accepted)
            }
            Err(busy) => {
                tracing::warn!(
                    session = %self.session,
                    ?command,
                    pending = busy.pending_code,
                    "command slot busy; ignoring"
                );
                self.diagnostics.command_rejected_busy();
                Ok(CommandRequest::Busy)
            }
        }
    }

    fn status(&self) -> ProxyStatus {
        let flags = self.region.flags();
        ProxyStatus {
            frame_rate: self.region.frame_rate(),
            sleeping: flags.contains(StateFlags::SLEEPING),
            debug_mode: flags.contains(StateFlags::DEBUG_MODE),
            text_input_focus: flags.contains(StateFlags::TEXT_INPUT_FOCUS),
            top_closable_layer: self
                .region
                .top_closable_layer()
                .and_then(|l| Layer::from_ordinal(l as i32)),
            server_ready: flags.contains(StateFlags::SERVER_READY),
            client_connected: flags.contains(StateFlags::CLIENT_CONNECTED),
        }
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn modifier_tracker(&mut self) -> &mut ModifierTracker {
        &mut self.modifiers
    }

    fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = self.report {
            return report;
        }
        let started = Instant::now();
        let deadline = started + self.config.shutdown_timeout;
        // Best effort: a worker that already stopped has nothing more to say.
        let _ = self.follow_resize();

        let acknowledged = if self.region.has_flag(StateFlags::SERVER_READY) {
            let host_driven = self.config.pacing == Pacing::HostDriven;
            let mut sent = false;
            let mut nudged = false;
            while Instant::now() < deadline && self.region.has_flag(StateFlags::SERVER_READY) {
                match self.region.try_set_command(&Command::Shutdown.to_pending()) {
                    Ok(()) => {
                        sent = true;
                        break;
                    }
                    Err(_) => {
                        // A host-driven worker only consumes commands when ticked.
                        if host_driven && !nudged {
                            self.region.bump_tick_request();
                            nudged = true;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            }
            if sent && host_driven {
                // One more tick so the worker reaches the SHUTDOWN just written.
                self.region.bump_tick_request();
            }
            if sent {
                while self.region.has_flag(StateFlags::SERVER_READY) && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            !self.region.has_flag(StateFlags::SERVER_READY)
        } else {
            // Stopped before we asked: clean only if it was following our own SHUTDOWN.
            self.shutdown_sent
        };

        let exited = self
            .link
            .reclaim(deadline.saturating_duration_since(Instant::now()));
        self.region.set_flag(StateFlags::CLIENT_CONNECTED, false);

        let outcome = if acknowledged && exited {
            ShutdownOutcome::Clean
        } else {
            // Forced reclamation: drop the name so nothing attaches to a dead region.
            if let Err(err) = self.namespace.remove(&self.name) {
                tracing::warn!(session = %self.session, "failed to remove region: {err}");
            }
            ShutdownOutcome::Abnormal
        };
        let report = ShutdownReport {
            outcome,
            elapsed: started.elapsed(),
        };
        match outcome {
            ShutdownOutcome::Clean => {
                tracing::info!(session = %self.session, elapsed = ?report.elapsed, "worker shut down cleanly")
            }
            ShutdownOutcome::Abnormal => tracing::warn!(
                session = %self.session,
                acknowledged,
                exited,
                elapsed = ?report.elapsed,
                "worker shut down abnormally"
            ),
        }
        self.report = Some(report);
        report
    }
}

impl Drop for RemoteKernel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
