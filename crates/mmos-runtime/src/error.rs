use std::time::Duration;

use mmos_ipc::IpcError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// A failure reported by (or caught around) the simulated kernel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    #[error("kernel failure: {0}")]
    Failed(String),

    #[error("kernel panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("kernel is not running")]
    NotRunning,

    #[error("worker failed to start: {0}")]
    StartupFailed(String),

    #[error("worker did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("could not connect to worker within {0:?}")]
    ConnectTimeout(Duration),

    #[error("worker did not acknowledge tick within {0:?}")]
    TickTimeout(Duration),

    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
