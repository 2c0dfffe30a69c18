//! Per-frame kernel stepping shared by the in-process proxy and the worker loop.
//!
//! Both execution modes funnel input, commands and rendering through [`KernelDriver`] so a
//! scripted session produces the same frames either way.

use mmos_ipc::layout::{valid_dimensions, DEFAULT_FRAME_RATE};
use mmos_ipc::{Command, InputEvent, PendingCommand};

use crate::config::{RuntimeConfig, MAX_FRAME_RATE};
use crate::error::KernelError;
use crate::kernel::{guarded, Kernel, KernelStatus};
use crate::metrics::Diagnostics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandEffect {
    Applied,
    Ignored,
    Shutdown,
    Resized { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Rendered,
    SkippedSleeping,
    /// `escalate` is set once the consecutive failure threshold is reached.
    Failed { escalate: bool },
}

pub(crate) struct KernelDriver {
    kernel: Box<dyn Kernel>,
    session: String,
    width: u32,
    height: u32,
    frame: Vec<u32>,
    sleeping: bool,
    frame_rate: u32,
    consecutive_failures: u32,
    max_failures: u32,
    diagnostics: Diagnostics,
}

impl KernelDriver {
    pub(crate) fn new(
        kernel: Box<dyn Kernel>,
        session: &str,
        config: &RuntimeConfig,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            kernel,
            session: session.to_string(),
            width: config.width,
            height: config.height,
            frame: vec![0; config.width as usize * config.height as usize],
            sleeping: false,
            frame_rate: config.frame_rate,
            consecutive_failures: 0,
            max_failures: config.max_consecutive_frame_failures.max(1),
            diagnostics,
        }
    }

    pub(crate) fn init(&mut self) -> Result<(), KernelError> {
        let (width, height) = (self.width, self.height);
        let kernel = &mut self.kernel;
        guarded(|| kernel.init(width, height))?;
        let fps = self.frame_rate;
        let kernel = &mut self.kernel;
        guarded(|| {
            kernel.set_frame_rate(fps);
            Ok(())
        })
    }

    pub(crate) fn width(&self) -> u32 {
        self.width
    }

    pub(crate) fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn frame(&self) -> &[u32] {
        &self.frame
    }

    pub(crate) fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub(crate) fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub(crate) fn status(&self) -> KernelStatus {
        let kernel = &self.kernel;
        guarded(|| Ok(kernel.status())).unwrap_or_default()
    }

    pub(crate) fn apply_input(&mut self, event: &InputEvent) {
        if let InputEvent::Noop { tag } = event {
            tracing::debug!(session = %self.session, tag, "skipping unknown input event");
            return;
        }
        let kernel = &mut self.kernel;
        match guarded(|| kernel.handle_input(event)) {
            Ok(()) => self.diagnostics.input_applied(),
            Err(err) => {
                tracing::warn!(session = %self.session, ?event, "input event failed: {err}");
            }
        }
    }

    /// Run a kernel hook that has no result of its own, logging a panic.
    fn hook(&mut self, name: &'static str, f: impl FnOnce(&mut dyn Kernel)) -> CommandEffect {
        let kernel = &mut *self.kernel;
        match guarded(|| {
            f(kernel);
            Ok(())
        }) {
            Ok(()) => CommandEffect::Applied,
            Err(err) => {
                tracing::warn!(session = %self.session, command = name, "command hook failed: {err}");
                CommandEffect::Ignored
            }
        }
    }

    pub(crate) fn apply_command(&mut self, pending: &PendingCommand) -> CommandEffect {
        let Some(command) = pending.to_command() else {
            tracing::warn!(
                session = %self.session,
                code = pending.code,
                arg1 = pending.arg1,
                arg2 = pending.arg2,
                "ignoring unknown command"
            );
            self.diagnostics.command_ignored();
            return CommandEffect::Ignored;
        };

        tracing::info!(session = %self.session, ?command, "applying command");
        let effect = match command {
            Command::Init => {
                tracing::debug!(session = %self.session, "kernel already initialised");
                CommandEffect::Ignored
            }
            Command::Shutdown => CommandEffect::Shutdown,
            Command::Sleep => {
                let effect = self.hook("sleep", |k| k.sleep());
                self.sleeping = true;
                effect
            }
            Command::Wake => {
                let effect = self.hook("wake", |k| k.wake());
                self.sleeping = false;
                effect
            }
            Command::GoHome => self.hook("go_home", |k| k.go_home()),
            Command::HomeButton => self.hook("home_button", |k| k.home_button()),
            Command::AddLayer(layer) => self.hook("add_layer", |k| k.add_layer(layer)),
            Command::RemoveLayer(layer) => self.hook("remove_layer", |k| k.remove_layer(layer)),
            Command::SetFrameRate(fps) => {
                let fps = if fps > 0 {
                    fps.min(MAX_FRAME_RATE)
                } else {
                    DEFAULT_FRAME_RATE
                };
                self.frame_rate = fps;
                self.hook("set_frame_rate", |k| k.set_frame_rate(fps))
            }
            Command::Resize { width, height } => self.resize(width, height),
        };

        match effect {
            CommandEffect::Ignored => self.diagnostics.command_ignored(),
            _ => self.diagnostics.command_applied(),
        }
        effect
    }

    fn resize(&mut self, width: u32, height: u32) -> CommandEffect {
        if !valid_dimensions(width, height) {
            tracing::warn!(session = %self.session, width, height, "ignoring resize to invalid dimensions");
            return CommandEffect::Ignored;
        }
        if (width, height) == (self.width, self.height) {
            return CommandEffect::Applied;
        }
        let kernel = &mut self.kernel;
        if let Err(err) = guarded(|| kernel.resize(width, height)) {
            tracing::warn!(session = %self.session, width, height, "kernel rejected resize: {err}");
            return CommandEffect::Ignored;
        }
        self.width = width;
        self.height = height;
        self.frame = vec![0; width as usize * height as usize];
        CommandEffect::Resized { width, height }
    }

    /// Advance and draw one frame into the back buffer unless sleeping.
    pub(crate) fn render(&mut self) -> FrameOutcome {
        if self.sleeping {
            self.diagnostics.frame_skipped_sleeping();
            return FrameOutcome::SkippedSleeping;
        }

        let kernel = &mut self.kernel;
        let frame = &mut self.frame;
        match guarded(|| {
            kernel.update()?;
            kernel.render(frame)
        }) {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.diagnostics.frame_rendered();
                FrameOutcome::Rendered
            }
            Err(err) => {
                self.consecutive_failures += 1;
                self.diagnostics.frame_failed();
                tracing::error!(
                    session = %self.session,
                    consecutive = self.consecutive_failures,
                    "frame failed: {err}"
                );
                let escalate = self.consecutive_failures >= self.max_failures;
                if escalate {
                    tracing::error!(
                        session = %self.session,
                        threshold = self.max_failures,
                        "consecutive frame failure threshold reached; stopping"
                    );
                }
                FrameOutcome::Failed { escalate }
            }
        }
    }

    /// Tear the kernel down. Returns `false` if the kernel panicked while shutting down.
    pub(crate) fn shutdown(&mut self) -> bool {
        let kernel = &mut self.kernel;
        match guarded(|| {
            kernel.shutdown();
            Ok(())
        }) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(session = %self.session, "kernel shutdown failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoKernel;
    use mmos_ipc::{CommandType, Layer};

    fn driver() -> (KernelDriver, Diagnostics) {
        let config = RuntimeConfig {
            width: 8,
            height: 6,
            ..Default::default()
        };
        let diagnostics = Diagnostics::new();
        let mut d = KernelDriver::new(Box::new(DemoKernel::new()), "t", &config, diagnostics.clone());
        d.init().unwrap();
        (d, diagnostics)
    }

    #[test]
    fn sleeping_skips_rendering() {
        let (mut d, diag) = driver();
        assert_eq!(d.apply_command(&Command::Sleep.into()), CommandEffect::Applied);
        assert!(d.is_sleeping());
        assert_eq!(d.render(), FrameOutcome::SkippedSleeping);
        d.apply_command(&Command::Wake.into());
        assert_eq!(d.render(), FrameOutcome::Rendered);
        let snap = diag.snapshot();
        assert_eq!(snap.frames_skipped_sleeping, 1);
        assert_eq!(snap.frames_rendered, 1);
        assert_eq!(snap.commands_applied, 2);
    }

    #[test]
    fn unknown_and_invalid_commands_are_ignored() {
        let (mut d, diag) = driver();
        let unknown = PendingCommand {
            code: 42,
            ..Default::default()
        };
        assert_eq!(d.apply_command(&unknown), CommandEffect::Ignored);
        let bad_layer = PendingCommand {
            code: CommandType::AddLayer.code(),
            arg1: 17,
            ..Default::default()
        };
        assert_eq!(d.apply_command(&bad_layer), CommandEffect::Ignored);
        assert_eq!(diag.snapshot().commands_ignored, 2);
    }

    #[test]
    fn frame_rate_zero_falls_back_to_default() {
        let (mut d, _) = driver();
        d.apply_command(&Command::SetFrameRate(0).into());
        assert_eq!(d.frame_rate(), 60);
        d.apply_command(&Command::SetFrameRate(1000).into());
        assert_eq!(d.frame_rate(), MAX_FRAME_RATE);
    }

    #[test]
    fn resize_reallocates_back_buffer() {
        let (mut d, _) = driver();
        assert_eq!(
            d.apply_command(&Command::Resize { width: 4, height: 2 }.into()),
            CommandEffect::Resized { width: 4, height: 2 }
        );
        assert_eq!(d.frame().len(), 8);
        assert_eq!(d.render(), FrameOutcome::Rendered);
    }

    #[test]
    fn layers_reach_kernel_status() {
        let (mut d, _) = driver();
        d.apply_command(&Command::AddLayer(Layer::Popup).into());
        assert_eq!(d.status().top_closable_layer, Some(Layer::Popup));
        assert_eq!(d.apply_command(&Command::Shutdown.into()), CommandEffect::Shutdown);
    }
}
