use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use mmos_ipc::layout::{DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use mmos_ipc::FileNamespace;
use mmos_runtime::{Pacing, RuntimeConfig, Session};

#[derive(Debug, Parser)]
#[command(
    name = "mmos",
    version,
    about = "Run a simulated device kernel behind a shared-memory transport."
)]
pub struct Cli {
    /// Log filter (tracing-subscriber EnvFilter syntax). Falls back to `RUST_LOG`, then `info`.
    ///
    /// Environment variable: `MMOS_LOG_LEVEL`.
    #[arg(long, env = "MMOS_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Run a worker: create the session's region and serve frames until shut down.
    Serve(SessionArgs),
    /// Attach to (or spawn) a worker and drive it for a number of frames.
    Host(HostArgs),
    /// Drive the same script through the in-process and worker-thread kernels and compare frames.
    Demo(DemoArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Session identifier; the region is named after it.
    ///
    /// Environment variable: `MMOS_SESSION`.
    #[arg(long, env = "MMOS_SESSION", default_value = "default")]
    pub session: String,

    /// Environment variable: `MMOS_WIDTH`.
    #[arg(long, env = "MMOS_WIDTH", default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Environment variable: `MMOS_HEIGHT`.
    #[arg(long, env = "MMOS_HEIGHT", default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Target frames per second for a free-running worker.
    ///
    /// Environment variable: `MMOS_FRAME_RATE`.
    #[arg(long, env = "MMOS_FRAME_RATE", default_value_t = DEFAULT_FRAME_RATE)]
    pub frame_rate: u32,

    /// `free-running` or `host-driven`.
    ///
    /// Environment variable: `MMOS_PACING`.
    #[arg(long, env = "MMOS_PACING", default_value_t = Pacing::FreeRunning)]
    pub pacing: Pacing,

    /// Consecutive failed frames before the kernel is stopped.
    ///
    /// Environment variable: `MMOS_MAX_FRAME_FAILURES`.
    #[arg(long, env = "MMOS_MAX_FRAME_FAILURES", default_value_t = 3)]
    pub max_frame_failures: u32,

    /// Directory holding the region files. Defaults to `<temp-dir>/mmos`.
    ///
    /// Environment variable: `MMOS_REGION_DIR`.
    #[arg(long, env = "MMOS_REGION_DIR", value_name = "DIR")]
    pub region_dir: Option<PathBuf>,
}

impl SessionArgs {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            pacing: self.pacing,
            max_consecutive_frame_failures: self.max_frame_failures,
            ..Default::default()
        }
    }

    pub fn region_dir(&self) -> PathBuf {
        self.region_dir
            .clone()
            .unwrap_or_else(FileNamespace::default_dir)
    }

    /// Session over the file-backed namespace, so other processes can attach.
    pub fn file_session(&self) -> Session {
        Session::with_namespace(
            self.session.clone(),
            self.runtime_config(),
            Arc::new(FileNamespace::new(self.region_dir())),
        )
    }
}

#[derive(Debug, Args)]
pub struct HostArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Launch `mmos serve` as a child process instead of attaching to a running worker.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub spawn: bool,

    /// Number of host frames to drive.
    #[arg(long, default_value_t = 120)]
    pub ticks: u32,

    /// Write the last frame to this PNG file.
    #[arg(long, value_name = "PATH")]
    pub png: Option<PathBuf>,

    /// Print session diagnostics as JSON on stdout.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub stats: bool,
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    #[arg(long, default_value_t = 64)]
    pub width: u32,

    #[arg(long, default_value_t = 96)]
    pub height: u32,

    #[arg(long, default_value_t = 90)]
    pub ticks: u32,

    /// Write the last frame to this PNG file.
    #[arg(long, value_name = "PATH")]
    pub png: Option<PathBuf>,
}
