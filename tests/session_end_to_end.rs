use std::sync::Arc;

use anyhow::Result;
use mmos::ipc::{FileNamespace, RegionNamespace, StateFlags};
use mmos::{
    Command, DemoKernel, ExecutionMode, KernelProxy, Layer, Pacing, PointerKind, RuntimeConfig,
    RuntimeError, Session,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        width: 40,
        height: 30,
        pacing: Pacing::HostDriven,
        ..Default::default()
    }
}

#[test]
fn sessions_sharing_a_directory_stay_isolated() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let namespace: Arc<dyn RegionNamespace> = Arc::new(FileNamespace::new(dir.path()));
    let first = Session::with_namespace("phone-1", config(), Arc::clone(&namespace));
    let second = Session::with_namespace("phone 2", config(), Arc::clone(&namespace));
    assert_ne!(first.region_name(), second.region_name());

    let mut a = first.start(ExecutionMode::Thread, Box::new(DemoKernel::new()))?;
    let mut b = second.start(ExecutionMode::Thread, Box::new(DemoKernel::new()))?;

    a.tick()?;
    a.tick()?;
    b.tick()?;
    assert_eq!(a.frame_count(), 2);
    assert_eq!(b.frame_count(), 1);

    assert!(a.shutdown().is_clean());
    assert!(namespace.attach(&first.region_name()).is_err());

    b.request_command(Command::AddLayer(Layer::LockScreen))?;
    b.tick()?;
    assert_eq!(b.status().top_closable_layer, Some(Layer::LockScreen));
    let region = namespace.attach(&second.region_name())?;
    assert!(region.has_flag(StateFlags::SERVER_READY));
    assert!(region.has_flag(StateFlags::CLIENT_CONNECTED));
    drop(region);

    assert!(b.shutdown().is_clean());
    Ok(())
}

#[test]
fn hostile_session_ids_stay_inside_the_region_dir() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let namespace = FileNamespace::new(dir.path());
    let session = Session::new("../../etc/passwd", config());
    let name = session.region_name();
    assert!(name.starts_with("mmos_shm_"));
    assert!(!name.contains('/') && !name.contains('.'));
    assert_eq!(namespace.path_for(&name).parent(), Some(dir.path()));
    Ok(())
}

#[test]
fn local_session_runs_a_whole_lifecycle() -> Result<()> {
    init_tracing();
    let session = Session::new("lifecycle", config());
    let mut proxy = session.start(ExecutionMode::Local, Box::new(DemoKernel::new()))?;

    for i in 0..10 {
        proxy.submit_pointer_event(PointerKind::Move, i, i)?;
        proxy.tick()?;
    }
    proxy.request_command(Command::HomeButton)?;
    proxy.tick()?;
    assert_eq!(proxy.status().top_closable_layer, Some(Layer::ControlCenter));
    proxy.request_command(Command::HomeButton)?;
    proxy.tick()?;
    assert_eq!(proxy.status().top_closable_layer, None);

    proxy.request_command(Command::Shutdown)?;
    proxy.tick()?;
    assert!(matches!(proxy.tick(), Err(RuntimeError::NotRunning)));
    assert_eq!(proxy.frame_count(), 12);
    assert!(proxy.shutdown().is_clean());

    let stats = session.diagnostics().snapshot();
    assert_eq!(stats.frames_rendered, 12);
    assert_eq!(stats.input_applied, 10);
    assert_eq!(stats.commands_applied, 3);
    Ok(())
}
