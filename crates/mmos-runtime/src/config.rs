use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use mmos_ipc::layout::{valid_dimensions, DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use thiserror::Error;

pub const MAX_FRAME_RATE: u32 = 240;

/// How the worker decides when to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// The worker renders on its own fixed-rate schedule; `tick()` only picks up the latest frame.
    #[default]
    FreeRunning,
    /// The worker renders exactly one frame per `tick()`.
    HostDriven,
}

impl Pacing {
    pub fn as_str(self) -> &'static str {
        match self {
            Pacing::FreeRunning => "free-running",
            Pacing::HostDriven => "host-driven",
        }
    }
}

impl fmt::Display for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pacing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free-running" | "free" => Ok(Pacing::FreeRunning),
            "host-driven" | "host" => Ok(Pacing::HostDriven),
            other => Err(ConfigError::UnknownPacing(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid framebuffer dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },

    #[error("frame rate must be in 1..={MAX_FRAME_RATE}, got {0}")]
    FrameRate(u32),

    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),

    #[error("max_consecutive_frame_failures must be at least 1")]
    FailureThreshold,

    #[error("unknown pacing `{0}` (expected `free-running` or `host-driven`)")]
    UnknownPacing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub pacing: Pacing,
    /// Poll period of a host-driven worker waiting for the next tick request.
    pub idle_poll_interval: Duration,
    /// Consecutive failed frames after which the worker stops.
    pub max_consecutive_frame_failures: u32,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub tick_timeout: Duration,
    pub connect_retry_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            pacing: Pacing::FreeRunning,
            idle_poll_interval: Duration::from_millis(1),
            max_consecutive_frame_failures: 3,
            startup_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            tick_timeout: Duration::from_secs(1),
            connect_retry_interval: Duration::from_millis(100),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !valid_dimensions(self.width, self.height) {
            return Err(ConfigError::Dimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.frame_rate == 0 || self.frame_rate > MAX_FRAME_RATE {
            return Err(ConfigError::FrameRate(self.frame_rate));
        }
        if self.max_consecutive_frame_failures == 0 {
            return Err(ConfigError::FailureThreshold);
        }
        for (name, value) in [
            ("idle_poll_interval", self.idle_poll_interval),
            ("startup_timeout", self.startup_timeout),
            ("shutdown_timeout", self.shutdown_timeout),
            ("tick_timeout", self.tick_timeout),
            ("connect_retry_interval", self.connect_retry_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        Ok(())
    }

    /// Target duration of one frame at the configured rate.
    pub fn frame_period(&self) -> Duration {
        frame_period(self.frame_rate)
    }
}

pub(crate) fn frame_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.clamp(1, MAX_FRAME_RATE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        config.validate().unwrap();
        assert_eq!((config.width, config.height), (400, 600));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        let period = config.frame_period().as_secs_f64();
        assert!((period - 0.016_666).abs() < 1e-4);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = RuntimeConfig {
            frame_rate: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::FrameRate(0)));

        config.frame_rate = 60;
        config.width = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Dimensions { .. })));

        config.width = 10;
        config.shutdown_timeout = Duration::ZERO;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("shutdown_timeout"))
        );

        config.shutdown_timeout = Duration::from_secs(1);
        config.max_consecutive_frame_failures = 0;
        assert_eq!(config.validate(), Err(ConfigError::FailureThreshold));
    }

    #[test]
    fn pacing_parses() {
        assert_eq!("host-driven".parse::<Pacing>(), Ok(Pacing::HostDriven));
        assert_eq!("free".parse::<Pacing>(), Ok(Pacing::FreeRunning));
        assert!("fast".parse::<Pacing>().is_err());
        assert_eq!(Pacing::HostDriven.to_string(), "host-driven");
    }
}
