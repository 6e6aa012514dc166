//! End-to-end volume lifecycle through the public API

use std::fs;

use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

use ramsync::backend::DirectoryBackend;
use ramsync::recovery::was_clean_shutdown;
use ramsync::{
    BackendKind, ManagerConfig, SyncEngine, SyncStrategy, VolumeConfig, VolumeManager,
};

fn manager(ram_base: &std::path::Path) -> VolumeManager {
    VolumeManager::with_backend(
        ManagerConfig::default().with_backend(BackendKind::Directory),
        Box::new(DirectoryBackend::with_base(ram_base)),
    )
}

fn seeded() -> TempDir {
    let temp = TempDir::new().expect("tempdir");
    temp.child("disk/config.json").write_str("{}").expect("write");
    temp.child("disk/data/records.csv")
        .write_str("id,value\n1,a\n")
        .expect("write");
    temp
}

#[test]
fn mount_write_persist_and_remount() {
    let temp = seeded();
    let disk = temp.child("disk");
    let ram_base = temp.child("ram");

    let manager = manager(ram_base.path());
    let ram = manager
        .register(VolumeConfig::new("app", disk.path()))
        .expect("register");
    manager.mount("app").expect("mount");

    let ram_dir = assert_fs::fixture::ChildPath::new(&ram);
    ram_dir
        .child("data/records.csv")
        .assert(predicate::str::contains("1,a"));

    let controller = manager
        .dual_write("app")
        .expect("lookup")
        .expect("dual-write enabled");
    let result = controller.write("data/new.csv", "id\n2\n");
    assert!(result.success && result.disk_written && result.ram_written);
    disk.child("data/new.csv").assert("id\n2\n");
    assert_eq!(
        controller.read_to_string("data/new.csv").as_deref(),
        Some("id\n2\n")
    );

    // application writes straight into memory are persisted on unmount
    fs::write(ram.join("config.json"), r#"{"tuned":true}"#).expect("write");
    let outcome = manager.unmount("app", true).expect("unmount");
    assert!(outcome.success(), "{:?}", outcome.error);

    disk.child("config.json").assert(r#"{"tuned":true}"#);
    ram_dir.assert(predicate::path::missing());
    let config = manager.volume_config("app").expect("config");
    assert!(was_clean_shutdown(&config));

    manager.mount("app").expect("remount");
    ram_dir.child("config.json").assert(r#"{"tuned":true}"#);
    ram_dir.child("data/new.csv").assert("id\n2\n");
    manager.shutdown();
}

#[test]
fn crash_discards_unpersisted_memory_changes() {
    let temp = seeded();
    let disk = temp.child("disk");
    let ram_base = temp.child("ram");

    let ram = {
        let manager = manager(ram_base.path());
        let ram = manager
            .register(VolumeConfig::new("app", disk.path()))
            .expect("register");
        manager.mount("app").expect("mount");
        fs::write(ram.join("config.json"), "never persisted").expect("write");
        fs::write(ram.join("scratch.tmp"), "junk").expect("write");
        // dropped without unmount or shutdown
        ram
    };

    let manager = manager(ram_base.path());
    manager
        .register(VolumeConfig::new("app", disk.path()))
        .expect("register");
    let report = manager.mount("app").expect("mount after crash");

    let recovery = report.recovery.expect("recovery ran");
    assert!(!recovery.clean_shutdown);
    assert!(recovery.recovery_needed);
    assert!(report.initial_sync.is_some_and(|s| s.success));

    let ram_dir = assert_fs::fixture::ChildPath::new(&ram);
    ram_dir.child("config.json").assert("{}");
    ram_dir.child("scratch.tmp").assert(predicate::path::missing());
    disk.child("config.json").assert("{}");
}

#[test]
fn incremental_sync_tracks_external_changes() {
    let temp = seeded();
    let disk = temp.child("disk");
    disk.child("old.log").write_str("old").expect("write");
    let ram = temp.child("ram");

    let config = VolumeConfig::new("app", disk.path())
        .with_ram_path(ram.path())
        .with_strategy(SyncStrategy::Incremental);
    let mut engine = SyncEngine::new(config);

    let first = engine.disk_to_ram(false);
    assert!(first.success);
    assert_eq!(first.files_copied, 3);

    disk.child("config.json")
        .write_str(r#"{"changed":"yes"}"#)
        .expect("write");
    disk.child("added.txt").write_str("added").expect("write");
    fs::remove_file(disk.child("old.log").path()).expect("remove");

    let second = engine.disk_to_ram(false);
    assert!(second.success, "{:?}", second.errors);
    assert_eq!(second.files_copied, 2);
    assert_eq!(second.files_deleted, 1);
    assert_eq!(second.files_unchanged, 1);
    assert_eq!(second.verified, Some(true));

    ram.child("config.json").assert(r#"{"changed":"yes"}"#);
    ram.child("old.log").assert(predicate::path::missing());
    assert!(engine.status().in_sync);
}
