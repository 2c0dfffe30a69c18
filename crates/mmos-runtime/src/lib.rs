//! Runs a simulated device kernel off the host's thread (or process) and exposes it to the host
//! through one [`KernelProxy`] interface.
//!
//! - [`LocalKernel`] drives the kernel in-process.
//! - [`RemoteKernel`] drives it through a shared region served by a [`Worker`], on a thread or in
//!   a separate process started with [`ProcessLauncher`].
//!
//! [`Session`] owns the configuration, region namespace and diagnostics for one device.

pub mod config;
pub mod demo;
mod driver;
pub mod error;
pub mod kernel;
pub mod launcher;
pub mod local;
pub mod metrics;
pub mod modifiers;
pub mod proxy;
pub mod remote;
pub mod session;
pub mod worker;

pub use config::{ConfigError, Pacing, RuntimeConfig};
pub use demo::DemoKernel;
pub use error::{KernelError, Result, RuntimeError};
pub use kernel::{Kernel, KernelStatus};
pub use launcher::ProcessLauncher;
pub use local::LocalKernel;
pub use metrics::{Diagnostics, DiagnosticsSnapshot};
pub use modifiers::ModifierTracker;
pub use proxy::{
    CommandRequest, KernelProxy, ProxyStatus, ShutdownOutcome, ShutdownReport, Submitted,
};
pub use remote::RemoteKernel;
pub use session::{ExecutionMode, Session};
pub use worker::{StopReason, Worker, WorkerHandle, WorkerState, WorkerStatus};
