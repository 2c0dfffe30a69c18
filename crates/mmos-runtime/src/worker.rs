//! Worker execution loop.
//!
//! The worker owns the kernel and the shared region. Each frame it drains queued input, applies
//! at most one command, renders and publishes a frame unless sleeping, and mirrors the kernel's
//! state into the header.
//!
//! State machine: `Starting -> Running (<-> Sleeping) -> Stopping -> Stopped`. A failed start goes
//! straight to `Stopped` with the error recorded.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mmos_ipc::state::tick_served;
use mmos_ipc::{
    publish_frame, Layer, PopError, RegionNamespace, SharedRegion, StateFlags,
    INPUT_QUEUE_CAPACITY,
};

use crate::config::{frame_period, Pacing, RuntimeConfig};
use crate::driver::{CommandEffect, FrameOutcome, KernelDriver};
use crate::error::{Result, RuntimeError};
use crate::kernel::Kernel;
use crate::metrics::Diagnostics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    /// Running with rendering suspended.
    Sleeping = 2,
    Stopping = 3,
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Sleeping,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Sleeping)
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SHUTDOWN command from the host.
    Command,
    /// External stop signal (the owning handle gave up waiting, or the process is exiting).
    Signal,
    /// Too many consecutive frame failures.
    FailureThreshold,
    /// The replacement region for a resize could not be allocated.
    RegionLost,
}

/// Worker state observable from other threads.
#[derive(Debug)]
pub struct WorkerStatus {
    state: AtomicU8,
    error: Mutex<Option<String>>,
}

impl WorkerStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Starting as u8),
            error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Last fatal error, if the worker stopped because of one.
    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_error(&self, message: String) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }
}

enum Step {
    Continue,
    Stop(StopReason),
}

pub struct Worker {
    session: String,
    name: String,
    namespace: Arc<dyn RegionNamespace>,
    config: RuntimeConfig,
    driver: KernelDriver,
    region: Option<Arc<SharedRegion>>,
    status: Arc<WorkerStatus>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    /// `name` is the region name the host will attach to.
    pub fn new(
        session: &str,
        name: &str,
        namespace: Arc<dyn RegionNamespace>,
        kernel: Box<dyn Kernel>,
        config: RuntimeConfig,
        diagnostics: Diagnostics,
    ) -> Self {
        let driver = KernelDriver::new(kernel, session, &config, diagnostics);
        Self {
            session: session.to_string(),
            name: name.to_string(),
            namespace,
            config,
            driver,
            region: None,
            status: Arc::new(WorkerStatus::new()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> Arc<WorkerStatus> {
        Arc::clone(&self.status)
    }

    /// Setting the flag makes the loop stop after the current frame.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Allocate the region, initialise the kernel and announce readiness.
    pub fn start(&mut self) -> Result<()> {
        self.status.set_state(WorkerState::Starting);
        self.config.validate()?;

        let region = match self
            .namespace
            .create(&self.name, self.config.width, self.config.height)
        {
            Ok(region) => region,
            Err(err) => {
                self.fail_start(format!("region allocation failed: {err}"));
                return Err(err.into());
            }
        };
        tracing::info!(
            session = %self.session,
            region = %self.name,
            width = self.config.width,
            height = self.config.height,
            "region created"
        );

        if let Err(err) = self.driver.init() {
            let message = format!("kernel initialisation failed: {err}");
            self.fail_start(message.clone());
            if let Err(err) = self.namespace.remove(&self.name) {
                tracing::warn!(session = %self.session, "failed to remove region: {err}");
            }
            return Err(RuntimeError::StartupFailed(message));
        }

        region.set_frame_rate(self.driver.frame_rate());
        self.region = Some(region);
        self.write_state();
        if let Some(region) = &self.region {
            region.set_flag(StateFlags::SERVER_READY, true);
        }
        self.status.set_state(WorkerState::Running);
        tracing::info!(session = %self.session, pacing = %self.config.pacing, "worker ready");
        Ok(())
    }

    fn fail_start(&self, message: String) {
        tracing::error!(session = %self.session, "{message}");
        self.status.record_error(message);
        self.status.set_state(WorkerState::Stopped);
    }

    /// Run frames until shutdown. Must follow a successful [`start`](Self::start).
    pub fn run(&mut self) -> Result<StopReason> {
        let mut region = self.region.clone().ok_or(RuntimeError::NotRunning)?;

        let reason = loop {
            if self.stop.load(Ordering::Acquire) {
                break StopReason::Signal;
            }
            let frame_start = Instant::now();

            let request = match self.config.pacing {
                Pacing::HostDriven => {
                    let req = region.tick_request();
                    // Commands, SHUTDOWN included, wait for the next tick like in-process ones.
                    if tick_served(region.tick_ack(), req) {
                        thread::sleep(self.config.idle_poll_interval);
                        continue;
                    }
                    Some(req)
                }
                Pacing::FreeRunning => None,
            };

            let step = self.step(request);
            if let Some(current) = &self.region {
                region = Arc::clone(current);
            }
            if let Step::Stop(reason) = step {
                break reason;
            }

            if self.config.pacing == Pacing::FreeRunning {
                let period = frame_period(self.driver.frame_rate());
                let elapsed = frame_start.elapsed();
                if elapsed < period {
                    thread::sleep(period - elapsed);
                }
            }
        };

        self.shutdown(reason);
        Ok(reason)
    }

    /// [`start`](Self::start) then [`run`](Self::run) on the current thread.
    pub fn run_to_completion(mut self) -> Result<StopReason> {
        self.start()?;
        self.run()
    }

    fn step(&mut self, request: Option<u32>) -> Step {
        let Some(region) = self.region.clone() else {
            return Step::Stop(StopReason::RegionLost);
        };

        let ring = region.input_ring();
        for _ in 0..INPUT_QUEUE_CAPACITY {
            match ring.try_pop() {
                Ok(event) => self.driver.apply_input(&event),
                Err(PopError::Empty) => break,
                Err(PopError::Corrupt) => {
                    tracing::warn!(session = %self.session, "input ring indices corrupt; discarding queue");
                    ring.discard_pending();
                    break;
                }
            }
        }

        let mut retired = None;
        if let Some(pending) = region.take_command() {
            match self.driver.apply_command(&pending) {
                CommandEffect::Shutdown => {
                    if let Some(req) = request {
                        region.set_tick_ack(req);
                    }
                    return Step::Stop(StopReason::Command);
                }
                CommandEffect::Resized { width, height } => match self.replace_region(width, height) {
                    Ok(old) => retired = Some(old),
                    Err(err) => {
                        let message = format!("resize to {width}x{height} failed: {err}");
                        tracing::error!(session = %self.session, "{message}");
                        self.status.record_error(message);
                        if let Some(req) = request {
                            region.set_tick_ack(req);
                        }
                        return Step::Stop(StopReason::RegionLost);
                    }
                },
                CommandEffect::Applied | CommandEffect::Ignored => {}
            }
        }

        let outcome = self.driver.render();
        if outcome == FrameOutcome::Rendered {
            if let Some(current) = &self.region {
                match publish_frame(current, self.driver.frame()) {
                    Ok(frame) => tracing::trace!(session = %self.session, frame, "frame published"),
                    Err(err) => tracing::error!(session = %self.session, "publish failed: {err}"),
                }
            }
        }
        self.write_state();

        if let Some(current) = &self.region {
            if let Some(req) = request {
                current.set_tick_ack(req);
            }
        }
        if let Some(old) = retired {
            // Retire before acknowledging so a host woken by the ack sees the region is gone.
            old.retire();
            if let Some(req) = request {
                old.set_tick_ack(req);
            }
            tracing::info!(session = %self.session, region = %self.name, "old region retired after resize");
        }

        match outcome {
            FrameOutcome::Failed { escalate: true } => {
                self.status
                    .record_error("consecutive frame failure threshold reached".to_string());
                Step::Stop(StopReason::FailureThreshold)
            }
            _ => Step::Continue,
        }
    }

    /// Allocate a region for the new size, carry the header state over and switch to it.
    /// Returns the old region, which the caller retires.
    fn replace_region(&mut self, width: u32, height: u32) -> Result<Arc<SharedRegion>> {
        let old = self.region.clone().ok_or(RuntimeError::NotRunning)?;
        let new = self.namespace.create(&self.name, width, height)?;

        new.set_frame_count(old.frame_count());
        new.set_frame_rate(old.frame_rate());
        new.set_top_closable_layer(old.top_closable_layer());
        for flag in old.flags().iter() {
            new.set_flag(flag, true);
        }
        new.seed_tick_counters(old.tick_request());

        tracing::info!(session = %self.session, region = %self.name, width, height, "region replaced for resize");
        self.region = Some(new);
        Ok(old)
    }

    fn write_state(&self) {
        let Some(region) = &self.region else {
            return;
        };
        let status = self.driver.status();
        let sleeping = self.driver.is_sleeping();
        region.set_frame_rate(self.driver.frame_rate());
        region.set_flag(StateFlags::SLEEPING, sleeping);
        region.set_flag(StateFlags::DEBUG_MODE, status.debug_mode);
        region.set_flag(StateFlags::TEXT_INPUT_FOCUS, status.text_input_focus);
        region.set_top_closable_layer(status.top_closable_layer.map(Layer::ordinal));

        if self.status.state().is_running() {
            self.status.set_state(if sleeping {
                WorkerState::Sleeping
            } else {
                WorkerState::Running
            });
        }
    }

    fn shutdown(&mut self, reason: StopReason) {
        let started = Instant::now();
        self.status.set_state(WorkerState::Stopping);
        tracing::info!(session = %self.session, ?reason, "worker stopping");

        let clean = self.driver.shutdown();
        if let Some(region) = self.region.take() {
            // Clearing SERVER_READY is the shutdown acknowledgement.
            region.set_flag(StateFlags::SERVER_READY, false);
            if let Err(err) = region.flush() {
                tracing::warn!(session = %self.session, "region flush failed: {err}");
            }
        }
        if let Err(err) = self.namespace.remove(&self.name) {
            tracing::warn!(session = %self.session, "failed to remove region: {err}");
        }

        self.status.set_state(WorkerState::Stopped);
        tracing::info!(
            session = %self.session,
            ?reason,
            clean,
            elapsed = ?started.elapsed(),
            "worker stopped"
        );
    }
}

/// Owning handle of a worker thread.
pub struct WorkerHandle {
    session: String,
    thread: Option<JoinHandle<()>>,
    done: mpsc::Receiver<()>,
    stop: Arc<AtomicBool>,
    status: Arc<WorkerStatus>,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("session", &self.session)
            .field("state", &self.status.state())
            .field("attached", &self.thread.is_some())
            .finish()
    }
}

impl WorkerHandle {
    /// Start `worker` on its own thread and wait (bounded by `startup_timeout`) for it to become
    /// ready.
    pub fn spawn(mut worker: Worker) -> Result<Self> {
        let session = worker.session.clone();
        let startup_timeout = worker.config.startup_timeout;
        let shutdown_timeout = worker.config.shutdown_timeout;
        let stop = worker.stop_flag();
        let status = worker.status();

        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<(), String>>(1);
        let (done_tx, done_rx) = mpsc::sync_channel::<()>(1);

        let thread = thread::Builder::new()
            .name(format!("mmos-worker-{session}"))
            .spawn(move || {
                match worker.start() {
                    Ok(()) => {
                        let _ = ready_tx.send(Ok(()));
                        if let Err(err) = worker.run() {
                            tracing::error!(session = %worker.session, "worker loop failed: {err}");
                        }
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(RuntimeError::Spawn)?;

        let mut handle = Self {
            session,
            thread: Some(thread),
            done: done_rx,
            stop,
            status,
            shutdown_timeout,
        };

        match ready_rx.recv_timeout(startup_timeout) {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(message)) => {
                handle.join_timeout(shutdown_timeout);
                Err(RuntimeError::StartupFailed(message))
            }
            Err(RecvTimeoutError::Disconnected) => {
                handle.join_timeout(shutdown_timeout);
                Err(RuntimeError::StartupFailed(
                    "worker thread exited during startup".to_string(),
                ))
            }
            Err(RecvTimeoutError::Timeout) => {
                handle.join_timeout(Duration::ZERO);
                Err(RuntimeError::StartupTimeout(startup_timeout))
            }
        }
    }

    pub fn state(&self) -> WorkerState {
        self.status.state()
    }

    pub fn status(&self) -> &Arc<WorkerStatus> {
        &self.status
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait up to `timeout` for the thread to finish and join it.
    ///
    /// On timeout the stop flag is raised and the thread is detached; it exits on its own once
    /// the kernel returns control. Returns `true` if the thread was joined.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    tracing::error!(session = %self.session, "worker thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                self.request_stop();
                tracing::warn!(
                    session = %self.session,
                    ?timeout,
                    "worker did not exit in time; detaching"
                );
                false
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.request_stop();
            self.join_timeout(self.shutdown_timeout);
        }
    }
}
