// ============================================================================
// File: packages/ramsync/src/recovery/tests.rs
// ----------------------------------------------------------------------------
// Tests for the shutdown marker, integrity checks and recovery
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::VolumeConfig;
use crate::sync::SyncEngine;

use super::*;

struct Tiers {
    _root: TempDir,
    disk: PathBuf,
    ram: PathBuf,
}

fn tiers() -> Tiers {
    let root = TempDir::new().expect("tempdir");
    let disk = root.path().join("disk");
    let ram = root.path().join("ram");
    fs::create_dir_all(&disk).expect("mkdir disk");
    Tiers {
        _root: root,
        disk,
        ram,
    }
}

fn config(t: &Tiers) -> VolumeConfig {
    VolumeConfig::new("test", &t.disk).with_ram_path(&t.ram)
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write fixture");
}

#[test]
fn marker_round_trip() {
    let t = tiers();
    let cfg = config(&t);

    assert!(!was_clean_shutdown(&cfg));
    mark_clean_shutdown(&cfg).expect("mark");
    assert!(was_clean_shutdown(&cfg));

    let marker = read_shutdown_marker(&cfg).expect("marker");
    assert!(marker.clean_shutdown);
    assert_eq!(marker.name, "test");
    assert_eq!(marker.disk_path, t.disk);
    assert_eq!(marker.ram_path.as_deref(), Some(t.ram.as_path()));

    clear_shutdown_marker(&cfg).expect("clear");
    assert!(!was_clean_shutdown(&cfg));
    // clearing twice is fine
    clear_shutdown_marker(&cfg).expect("clear again");
}

#[test]
fn invalid_markers_mean_unclean() {
    let t = tiers();
    let cfg = config(&t);
    let path = marker_path(&cfg);

    for body in [
        "not json",
        "[]",
        r#"{"timestamp": "2024-01-01T00:00:00Z"}"#,
        r#"{"clean_shutdown": false, "timestamp": "2024-01-01T00:00:00Z", "name": "test", "disk_path": "/d"}"#,
    ] {
        fs::write(&path, body).expect("write marker");
        assert!(!was_clean_shutdown(&cfg), "{body} counted as clean");
    }
}

#[test]
fn unclean_start_recovers_everything() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    write(&t.disk, "deep/b.txt", "2");
    let cfg = config(&t);

    let result = RecoveryManager::new().recover(&cfg, false);
    assert!(result.recovery_needed);
    assert!(!result.clean_shutdown);
    assert!(result.success());
    assert_eq!(result.files_synced, 2);
    assert_eq!(result.files_copied, vec!["a.txt".to_string(), "deep/b.txt".to_string()]);
    assert_eq!(fs::read_to_string(t.ram.join("deep/b.txt")).expect("read"), "2");

    let after = result.integrity_after.expect("integrity after");
    assert!(after.is_valid());
    assert_eq!(after.verified_count, 2);
}

#[test]
fn clean_start_with_intact_memory_skips_recovery() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    write(&t.ram, "a.txt", "1");
    let cfg = config(&t);
    mark_clean_shutdown(&cfg).expect("mark");

    let result = RecoveryManager::new().recover(&cfg, false);
    assert!(result.clean_shutdown);
    assert!(!result.recovery_needed);
    assert!(result.integrity_before.as_ref().is_some_and(IntegrityResult::is_valid));
    assert!(result.files_copied.is_empty());

    // the marker is consumed either way
    assert!(!marker_path(&cfg).exists());
}

#[test]
fn clean_start_with_corrupt_memory_recovers() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    write(&t.ram, "a.txt", "corrupted");
    let cfg = config(&t);
    mark_clean_shutdown(&cfg).expect("mark");

    let result = RecoveryManager::new().recover(&cfg, false);
    assert!(result.clean_shutdown);
    assert!(result.recovery_needed);
    let before = result.integrity_before.expect("integrity before");
    assert_eq!(before.mismatched_files, vec!["a.txt".to_string()]);
    assert_eq!(fs::read_to_string(t.ram.join("a.txt")).expect("read"), "1");
}

#[test]
fn clean_start_skips_integrity_when_volume_disables_verification() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    write(&t.ram, "a.txt", "corrupted");
    let cfg = config(&t).with_verify_after_sync(false);
    mark_clean_shutdown(&cfg).expect("mark");

    let status = RecoveryManager::new().check_status(&cfg);
    assert!(status.integrity.is_none());
    assert!(!status.recovery_needed);

    let result = RecoveryManager::new().recover(&cfg, false);
    assert!(result.clean_shutdown);
    assert!(!result.recovery_needed);
    assert!(result.integrity_before.is_none());
    assert!(result.files_copied.is_empty());
    assert_eq!(fs::read_to_string(t.ram.join("a.txt")).expect("read"), "corrupted");
}

#[test]
fn forced_recovery_ignores_marker() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    let cfg = config(&t);
    mark_clean_shutdown(&cfg).expect("mark");

    let result = RecoveryManager::new().recover(&cfg, true);
    assert!(result.recovery_needed);
    assert!(result.clean_shutdown);
    assert_eq!(result.files_synced, 1);
}

#[test]
fn recovery_never_copies_metadata() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    write(&t.disk, ".ram_disk_hashes.json", "{}");
    let cfg = config(&t);

    let result = RecoveryManager::new().recover(&cfg, false);
    assert_eq!(result.files_copied, vec!["a.txt".to_string()]);
    assert!(!t.ram.join(".ram_disk_hashes.json").exists());
}

#[test]
fn recovery_without_memory_path_reports_error() {
    let t = tiers();
    let cfg = VolumeConfig::new("test", &t.disk);

    let result = RecoveryManager::new().recover(&cfg, true);
    assert!(result.recovery_needed);
    assert!(!result.success());
    assert!(result.error.is_some());
}

#[test]
fn extra_memory_files_are_tolerated() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    write(&t.ram, "a.txt", "1");
    write(&t.ram, "scratch.tmp", "x");

    let result = verify_integrity(&config(&t));
    assert!(result.is_valid());
    assert!(!result.needs_recovery());
    assert_eq!(result.missing_on_disk, vec!["scratch.tmp".to_string()]);
    assert_eq!(result.total_files(), 1);
}

#[test]
fn integrity_reports_missing_roots() {
    let t = tiers();
    let result = verify_integrity(&config(&t));
    assert!(!result.is_valid());
    assert!(result.errors[0].starts_with("RAM path does not exist"));
}

#[test]
fn single_file_verification() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    write(&t.ram, "a.txt", "1");
    write(&t.disk, "b.txt", "2");
    let cfg = config(&t);

    let a = verify_single_file(&cfg, "a.txt");
    assert!(a.exists_on_disk && a.exists_in_ram);
    assert!(a.matches);
    assert_eq!(a.disk_digest, a.ram_digest);

    let b = verify_single_file(&cfg, "b.txt");
    assert!(b.exists_on_disk);
    assert!(!b.exists_in_ram);
    assert!(!b.matches);
    assert!(b.ram_digest.is_none());

    let bad = verify_single_file(&cfg, "../escape");
    assert!(bad.error.is_some());
}

#[test]
fn prepare_shutdown_persists_then_marks() {
    let t = tiers();
    write(&t.ram, "a.txt", "from memory");
    let cfg = config(&t);

    let outcome = RecoveryManager::new().prepare_shutdown(&cfg);
    assert!(outcome.success(), "{:?}", outcome.error);
    assert!(outcome.marker_written);
    assert!(outcome.sync.as_ref().is_some_and(|s| s.files_copied == 1));
    assert_eq!(fs::read_to_string(t.disk.join("a.txt")).expect("read"), "from memory");
    assert!(was_clean_shutdown(&cfg));

    // the next activation sees a clean shutdown
    let result = RecoveryManager::new().recover(&cfg, false);
    assert!(result.clean_shutdown);
    assert!(!result.recovery_needed);
}

#[test]
fn failed_persist_leaves_no_marker() {
    let t = tiers();
    write(&t.ram, "sub/a.txt", "1");
    // a file on disk where the persisted directory must go
    write(&t.disk, "sub", "blocker");
    let cfg = config(&t);

    let mut engine = SyncEngine::new(cfg.clone());
    let outcome = RecoveryManager::new().prepare_shutdown_with(&mut engine);
    assert!(!outcome.success());
    assert!(!outcome.marker_written);
    assert!(!was_clean_shutdown(&cfg));
}

#[test]
fn shutdown_without_persistence_only_marks() {
    let t = tiers();
    write(&t.ram, "a.txt", "1");
    let cfg = config(&t).with_persist_on_unmount(false);

    let outcome = RecoveryManager::new().prepare_shutdown(&cfg);
    assert!(outcome.success());
    assert!(outcome.sync.is_none());
    assert!(!t.disk.join("a.txt").exists());
}

#[test]
fn status_is_read_only() {
    let t = tiers();
    write(&t.disk, "a.txt", "1");
    let cfg = config(&t);
    mark_clean_shutdown(&cfg).expect("mark");

    let status = RecoveryManager::new().check_status(&cfg);
    assert!(status.clean_shutdown);
    assert!(!status.recovery_needed);
    assert!(status.disk_path_exists);
    assert!(!status.ram_path_exists);
    assert!(status.integrity.is_none());
    assert!(status.shutdown_info.is_some());

    // nothing consumed the marker
    assert!(was_clean_shutdown(&cfg));

    fs::create_dir_all(&t.ram).expect("mkdir ram");
    let status = RecoveryManager::new().check_status(&cfg);
    assert!(status.recovery_needed);
    assert_eq!(
        status.integrity.map(|i| i.missing_in_ram),
        Some(vec!["a.txt".to_string()])
    );
}
