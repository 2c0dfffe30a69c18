use std::fs;

use mmos_ipc::input::{InputEvent, Modifiers, PointerKind};
use mmos_ipc::layout::{region_bytes, region_name};
use mmos_ipc::{
    publish_frame, Command, FileNamespace, FrameReader, IpcError, RegionNamespace, Refresh,
    StateFlags,
};

#[test]
fn two_mappings_of_one_file_share_state() {
    let dir = tempfile::tempdir().unwrap();
    let ns = FileNamespace::new(dir.path());
    let name = region_name("world 1");

    let worker = ns.create(&name, 8, 4).unwrap();
    assert_eq!(
        fs::metadata(ns.path_for(&name)).unwrap().len() as usize,
        region_bytes(8, 4)
    );

    let host = ns.attach(&name).unwrap();
    assert_eq!((host.width(), host.height()), (8, 4));
    assert!(host.is_mapped());

    // host -> worker
    let ev = InputEvent::pointer(PointerKind::Down, 3, 2, Modifiers::CTRL);
    host.input_ring().try_push(&ev).unwrap();
    host.try_set_command(&Command::Sleep.into()).unwrap();
    host.set_flag(StateFlags::CLIENT_CONNECTED, true);

    assert_eq!(worker.input_ring().try_pop(), Ok(ev));
    assert_eq!(worker.take_command().unwrap().to_command(), Some(Command::Sleep));
    assert!(!host.command_pending());

    // worker -> host
    worker.set_flag(StateFlags::SERVER_READY, true);
    publish_frame(&worker, &[0xFF12_3456; 32]).unwrap();
    let mut reader = FrameReader::new(host.pixel_count());
    assert_eq!(
        reader.refresh(&host),
        Refresh::Updated { frame_count: 1, retries: 0 }
    );
    assert!(reader.pixels().iter().all(|px| *px == 0xFF12_3456));
    assert_eq!(
        host.flags(),
        StateFlags::SERVER_READY | StateFlags::CLIENT_CONNECTED
    );
}

#[test]
fn recreate_replaces_file_and_old_mapping_can_be_retired() {
    let dir = tempfile::tempdir().unwrap();
    let ns = FileNamespace::new(dir.path());

    let old = ns.create("r", 4, 4).unwrap();
    let host = ns.attach("r").unwrap();

    let new = ns.create("r", 2, 2).unwrap();
    old.retire();

    assert!(host.is_retired());
    assert!(!new.is_retired());
    let reattached = ns.attach("r").unwrap();
    assert_eq!((reattached.width(), reattached.height()), (2, 2));
}

#[test]
fn attach_rejects_foreign_or_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let ns = FileNamespace::new(dir.path());

    assert!(matches!(ns.attach("nope"), Err(IpcError::NotFound(_))));

    fs::write(ns.path_for("short"), [0u8; 16]).unwrap();
    assert!(matches!(
        ns.attach("short"),
        Err(IpcError::RegionSizeMismatch { .. })
    ));

    let mut junk = vec![0u8; region_bytes(1, 1)];
    junk[0..4].copy_from_slice(b"JUNK");
    fs::write(ns.path_for("junk"), &junk).unwrap();
    assert!(matches!(ns.attach("junk"), Err(IpcError::BadMagic { .. })));

    let region = ns.create("v2", 1, 1).unwrap();
    drop(region);
    let mut bytes = fs::read(ns.path_for("v2")).unwrap();
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
    fs::write(ns.path_for("v2"), &bytes).unwrap();
    assert!(matches!(
        ns.attach("v2"),
        Err(IpcError::VersionMismatch { found: 2, expected: 1 })
    ));

    ns.remove("v2").unwrap();
    ns.remove("v2").unwrap();
    assert!(!ns.path_for("v2").exists());
}
