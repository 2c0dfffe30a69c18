use std::process::{Command as Process, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mmos_ipc::{FileNamespace, PointerKind, RegionNamespace, StateFlags};
use mmos_runtime::{KernelProxy, Pacing, ProcessLauncher, RuntimeConfig, RuntimeError, Session};

const MMOS: &str = env!("CARGO_BIN_EXE_mmos");

fn config() -> RuntimeConfig {
    RuntimeConfig {
        width: 48,
        height: 64,
        pacing: Pacing::HostDriven,
        startup_timeout: Duration::from_secs(10),
        shutdown_timeout: Duration::from_secs(5),
        connect_retry_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

#[test]
fn launched_worker_serves_frames_and_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let namespace = Arc::new(FileNamespace::new(dir.path()));
    let session = Session::with_namespace("proc", config(), namespace.clone());
    let launcher = ProcessLauncher::new(MMOS).args(ProcessLauncher::serve_args(
        session.id(),
        session.config(),
        dir.path(),
    ));

    let mut proxy = session.launch(launcher).unwrap();
    assert_eq!((proxy.width(), proxy.height()), (48, 64));
    assert!(proxy.region().is_mapped());

    for i in 0..5 {
        proxy.submit_pointer_event(PointerKind::Move, i, i).unwrap();
        proxy.tick().unwrap();
    }
    assert_eq!(proxy.frame_count(), 5);
    assert!(proxy.current_frame().iter().any(|&px| px != 0));

    let report = proxy.shutdown();
    assert!(report.is_clean(), "{report:?}");
    assert!(!namespace.path_for(&session.region_name()).exists());
}

#[test]
fn host_attaches_to_a_separately_started_worker() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::with_namespace(
        "external",
        config(),
        Arc::new(FileNamespace::new(dir.path())),
    );
    let mut child = Process::new(MMOS)
        .args(ProcessLauncher::serve_args(
            session.id(),
            session.config(),
            dir.path(),
        ))
        .stdin(Stdio::null())
        .spawn()
        .unwrap();

    let mut proxy = session.connect().unwrap();
    proxy.tick().unwrap();
    assert_eq!(proxy.frame_count(), 1);
    assert!(proxy.shutdown().is_clean());
    assert!(child.wait().unwrap().success());
}

#[test]
fn worker_that_cannot_start_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::with_namespace(
        "broken",
        config(),
        Arc::new(FileNamespace::new(dir.path())),
    );
    // An unknown flag makes `mmos serve` exit before creating its region.
    let launcher = ProcessLauncher::new(MMOS).args(["serve", "--no-such-flag"]);
    let err = session.launch(launcher).unwrap_err();
    assert!(matches!(err, RuntimeError::StartupFailed(_)), "{err}");
}

#[cfg(unix)]
#[test]
fn sigterm_stops_the_worker_and_removes_its_region() {
    let dir = tempfile::tempdir().unwrap();
    let namespace = FileNamespace::new(dir.path());
    let session = Session::with_namespace(
        "term",
        config(),
        Arc::new(FileNamespace::new(dir.path())),
    );
    let name = session.region_name();
    let mut launcher = ProcessLauncher::new(MMOS).args(ProcessLauncher::serve_args(
        session.id(),
        session.config(),
        dir.path(),
    ));
    launcher.spawn().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(region) = namespace.attach(&name) {
            if region.has_flag(StateFlags::SERVER_READY) {
                break;
            }
        }
        assert!(Instant::now() < deadline, "worker never became ready");
        thread::sleep(Duration::from_millis(20));
    }

    let pid = launcher.pid().expect("worker is running");
    let status = Process::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    assert!(launcher.stop(Duration::from_secs(5)), "worker ignored SIGTERM");
    assert!(launcher.pid().is_none());
    assert!(!namespace.path_for(&name).exists());
}

#[test]
fn demo_subcommand_reports_identical_frames() {
    let output = Process::new(MMOS)
        .args(["demo", "--ticks", "20", "--width", "24", "--height", "24"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("20 frames identical"), "{stdout}");
}
