//! Session context: one powered-on simulated device.
//!
//! Everything a session needs (configuration, the region namespace, diagnostics) is owned here
//! and handed to the proxy and worker explicitly.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use mmos_ipc::layout::region_name;
use mmos_ipc::{IpcError, MemoryNamespace, RegionNamespace, SharedRegion, StateFlags};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::kernel::Kernel;
use crate::launcher::ProcessLauncher;
use crate::local::LocalKernel;
use crate::metrics::Diagnostics;
use crate::proxy::KernelProxy;
use crate::remote::{RemoteKernel, WorkerLink};
use crate::worker::{Worker, WorkerHandle};

/// Where the kernel runs. Chosen once, when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// On the caller's thread, inside `tick()`.
    Local,
    /// On a dedicated worker thread, through a heap region.
    Thread,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    config: RuntimeConfig,
    namespace: Arc<dyn RegionNamespace>,
    diagnostics: Diagnostics,
}

impl Session {
    /// Session backed by an in-process namespace.
    pub fn new(id: impl Into<String>, config: RuntimeConfig) -> Self {
        Self::with_namespace(id, config, Arc::new(MemoryNamespace::new()))
    }

    pub fn with_namespace(
        id: impl Into<String>,
        config: RuntimeConfig,
        namespace: Arc<dyn RegionNamespace>,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            namespace,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Arc<dyn RegionNamespace> {
        &self.namespace
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn region_name(&self) -> String {
        region_name(&self.id)
    }

    pub fn start(&self, mode: ExecutionMode, kernel: Box<dyn Kernel>) -> Result<Box<dyn KernelProxy>> {
        Ok(match mode {
            ExecutionMode::Local => Box::new(self.start_local(kernel)?),
            ExecutionMode::Thread => Box::new(self.start_thread(kernel)?),
        })
    }

    pub fn start_local(&self, kernel: Box<dyn Kernel>) -> Result<LocalKernel> {
        LocalKernel::start(kernel, &self.id, &self.config, self.diagnostics.clone())
    }

    /// Worker for this session, to run on a thread or as the body of a worker process.
    pub fn worker(&self, kernel: Box<dyn Kernel>) -> Worker {
        Worker::new(
            &self.id,
            &self.region_name(),
            Arc::clone(&self.namespace),
            kernel,
            self.config.clone(),
            self.diagnostics.clone(),
        )
    }

    /// Run the kernel on a worker thread and attach to it.
    pub fn start_thread(&self, kernel: Box<dyn Kernel>) -> Result<RemoteKernel> {
        self.config.validate()?;
        let handle = WorkerHandle::spawn(self.worker(kernel))?;
        let region = self.namespace.attach(&self.region_name())?;
        Ok(self.remote(region, WorkerLink::Thread(handle)))
    }

    /// Attach to a worker started elsewhere, waiting up to `startup_timeout` for it to be ready.
    pub fn connect(&self) -> Result<RemoteKernel> {
        let region = self.wait_ready(|| Ok(()))?;
        Ok(self.remote(region, WorkerLink::External))
    }

    /// Spawn a worker process and attach to it once ready. The process is stopped on failure.
    pub fn launch(&self, mut launcher: ProcessLauncher) -> Result<RemoteKernel> {
        self.config.validate()?;
        // A region left behind by a killed worker must not be mistaken for the new one.
        self.namespace.remove(&self.region_name())?;
        launcher.spawn()?;

        match self.wait_ready(|| {
            if launcher.is_running() {
                Ok(())
            } else {
                Err(RuntimeError::StartupFailed(
                    "worker process exited during startup".to_string(),
                ))
            }
        }) {
            Ok(region) => Ok(self.remote(region, WorkerLink::Process(launcher))),
            Err(err) => {
                launcher.stop(self.config.shutdown_timeout);
                Err(err)
            }
        }
    }

    fn remote(&self, region: Arc<SharedRegion>, link: WorkerLink) -> RemoteKernel {
        RemoteKernel::new(
            &self.id,
            &self.region_name(),
            Arc::clone(&self.namespace),
            region,
            self.config.clone(),
            self.diagnostics.clone(),
            link,
        )
    }

    fn wait_ready(&self, mut alive: impl FnMut() -> Result<()>) -> Result<Arc<SharedRegion>> {
        let name = self.region_name();
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            alive()?;
            attempts += 1;
            match self.namespace.attach(&name) {
                Ok(region) if region.has_flag(StateFlags::SERVER_READY) => {
                    tracing::debug!(session = %self.id, attempts, "worker ready");
                    return Ok(region);
                }
                Ok(_) | Err(IpcError::NotFound(_) | IpcError::Retired(_)) => {}
                // A header we can't speak is fatal, not something to wait out.
                Err(err) => return Err(err.into()),
            }
            if started.elapsed() >= self.config.startup_timeout {
                return Err(RuntimeError::ConnectTimeout(self.config.startup_timeout));
            }
            thread::sleep(self.config.connect_retry_interval);
        }
    }
}
