mod args;
mod signals;
mod snapshot;

use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mmos_ipc::PointerKind;
use mmos_runtime::{
    DemoKernel, ExecutionMode, KernelProxy, Pacing, ProcessLauncher, RuntimeConfig, Session,
    StopReason,
};
use tracing_subscriber::EnvFilter;

use args::{Cli, Cmd, DemoArgs, HostArgs, SessionArgs};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result = match cli.command {
        Cmd::Serve(args) => serve(args),
        Cmd::Host(args) => host(args),
        Cmd::Demo(args) => demo(args),
    };
    if let Err(err) = result {
        tracing::error!("mmos failed: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn serve(args: SessionArgs) -> Result<()> {
    let session = args.file_session();
    tracing::info!(
        session = %session.id(),
        dir = %args.region_dir().display(),
        pacing = %args.pacing,
        "serving"
    );
    let worker = session.worker(Box::new(DemoKernel::new()));
    signals::stop_on_signal(worker.stop_flag())?;
    let reason = worker.run_to_completion().context("worker failed")?;
    match reason {
        StopReason::Command | StopReason::Signal => Ok(()),
        StopReason::FailureThreshold | StopReason::RegionLost => {
            bail!("worker stopped: {reason:?}")
        }
    }
}

fn host(args: HostArgs) -> Result<()> {
    let session = args.session.file_session();
    let mut proxy = if args.spawn {
        let launcher = ProcessLauncher::current_exe()?.args(ProcessLauncher::serve_args(
            session.id(),
            session.config(),
            &args.session.region_dir(),
        ));
        session.launch(launcher).context("launch worker")?
    } else {
        session.connect().context("connect to worker")?
    };

    let period = session.config().frame_period();
    let started = Instant::now();
    for i in 0..args.ticks {
        let frame_start = Instant::now();
        drive(&mut proxy, i)?;
        if session.config().pacing == Pacing::FreeRunning {
            if let Some(rest) = period.checked_sub(frame_start.elapsed()) {
                thread::sleep(rest);
            }
        }
    }
    tracing::info!(
        ticks = args.ticks,
        frames = proxy.frame_count(),
        elapsed = ?started.elapsed(),
        "host run finished"
    );

    if let Some(path) = &args.png {
        snapshot::write_png(path, proxy.width(), proxy.height(), proxy.current_frame())?;
    }
    if args.stats {
        println!(
            "{}",
            serde_json::to_string_pretty(&proxy.diagnostics().snapshot())?
        );
    }

    let report = proxy.shutdown();
    if !report.is_clean() {
        bail!("worker shut down abnormally after {:?}", report.elapsed);
    }
    Ok(())
}

/// One host frame of a fixed input script: the pointer sweeps the screen and taps every 30th
/// frame.
fn drive(proxy: &mut dyn KernelProxy, i: u32) -> Result<()> {
    let (w, h) = (proxy.width() as i32, proxy.height() as i32);
    let x = (i as i32 * 7).rem_euclid(w.max(1));
    let y = (i as i32 * 5).rem_euclid(h.max(1));
    if i % 30 == 15 {
        proxy.submit_pointer_event(PointerKind::Down, x, y)?;
        proxy.submit_pointer_event(PointerKind::Up, x, y)?;
    } else {
        proxy.submit_pointer_event(PointerKind::Move, x, y)?;
    }
    if i % 45 == 44 {
        proxy.submit_wheel_event(x, y, -1.0)?;
    }
    proxy.tick()?;
    Ok(())
}

fn demo(args: DemoArgs) -> Result<()> {
    let config = RuntimeConfig {
        width: args.width,
        height: args.height,
        pacing: Pacing::HostDriven,
        ..Default::default()
    };
    let local = Session::new("demo-local", config.clone());
    let remote = Session::new("demo-thread", config);
    let mut a = local.start(ExecutionMode::Local, Box::new(DemoKernel::new()))?;
    let mut b = remote.start(ExecutionMode::Thread, Box::new(DemoKernel::new()))?;

    for i in 0..args.ticks {
        drive(a.as_mut(), i)?;
        drive(b.as_mut(), i)?;
        if a.frame_count() != b.frame_count() || a.current_frame() != b.current_frame() {
            bail!("local and worker-thread kernels diverged at frame {i}");
        }
    }
    tracing::info!(frames = a.frame_count(), "local and worker-thread kernels agree");

    if let Some(path) = &args.png {
        snapshot::write_png(path, b.width(), b.height(), b.current_frame())?;
    }
    let (ra, rb) = (a.shutdown(), b.shutdown());
    if !(ra.is_clean() && rb.is_clean()) {
        bail!("demo shut down abnormally: local {ra:?}, thread {rb:?}");
    }
    println!("ok: {} frames identical", a.frame_count());
    Ok(())
}
