//! Worker process management for the cross-process mode.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Spawns and supervises one worker process (`mmos serve ...`).
#[derive(Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    child: Option<Child>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            child: None,
        }
    }

    /// Launcher for the running executable, for binaries that double as their own worker.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe().map_err(RuntimeError::Spawn)?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments for `mmos serve` matching `config`.
    pub fn serve_args(session: &str, config: &RuntimeConfig, region_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["serve".into(), "--session".into(), session.into()];
        for (flag, value) in [
            ("--width", config.width.to_string()),
            ("--height", config.height.to_string()),
            ("--frame-rate", config.frame_rate.to_string()),
            ("--pacing", config.pacing.to_string()),
            (
                "--max-frame-failures",
                config.max_consecutive_frame_failures.to_string(),
            ),
        ] {
            args.push(flag.into());
            args.push(value.into());
        }
        args.push("--region-dir".into());
        args.push(region_dir.as_os_str().to_owned());
        args
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn spawn(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(RuntimeError::Spawn)?;
        tracing::info!(pid = child.id(), program = %self.program.display(), "worker process spawned");
        self.child = Some(child);
        Ok(())
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | None => false,
            Some(Err(err)) => {
                tracing::warn!("failed to poll worker process: {err}");
                false
            }
        }
    }

    /// Wait up to `timeout` for the process to exit, then kill it.
    ///
    /// Returns `true` if it exited on its own.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let Some(child) = self.child.as_mut() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::info!(pid = child.id(), %status, "worker process exited");
                    self.child = None;
                    return true;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!("failed to poll worker process: {err}");
                    break;
                }
            }
        }

        tracing::warn!(pid = child.id(), ?timeout, "worker process did not exit; killing");
        if let Err(err) = child.kill() {
            tracing::warn!("failed to kill worker process: {err}");
        }
        if let Err(err) = child.wait() {
            tracing::warn!("failed to reap worker process: {err}");
        }
        self.child = None;
        false
    }
}

impl Drop for ProcessLauncher {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.stop(Duration::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pacing;

    #[test]
    fn serve_args_carry_config() {
        let config = RuntimeConfig {
            width: 320,
            pacing: Pacing::HostDriven,
            ..Default::default()
        };
        let args = ProcessLauncher::serve_args("world", &config, Path::new("/tmp/mmos"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(&args[..3], &["serve", "--session", "world"]);
        let pos = args.iter().position(|a| a == "--width").unwrap();
        assert_eq!(args[pos + 1], "320");
        let pos = args.iter().position(|a| a == "--pacing").unwrap();
        assert_eq!(args[pos + 1], "host-driven");
        assert_eq!(args.last().unwrap(), "/tmp/mmos");
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let mut launcher = ProcessLauncher::new("/nonexistent/mmos-worker");
        assert!(matches!(launcher.spawn(), Err(RuntimeError::Spawn(_))));
        assert!(!launcher.is_running());
        assert!(launcher.stop(Duration::ZERO));
    }
}
