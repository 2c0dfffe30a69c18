use thiserror::Error;

pub type Result<T> = std::result::Result<T, IpcError>;

/// Errors raised while creating or attaching a shared region.
///
/// Every variant is fatal for the attach attempt: a region that fails validation is never used
/// in a degraded mode.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("bad magic 0x{found:08x} (expected 0x{expected:08x})")]
    BadMagic { found: u32, expected: u32 },

    #[error("protocol version {found} not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("invalid framebuffer dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("region size mismatch: {actual} bytes, layout requires {expected}")]
    RegionSizeMismatch { actual: usize, expected: usize },

    #[error("region `{0}` not found")]
    NotFound(String),

    #[error("region `{0}` has been retired")]
    Retired(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
