//! Command line behaviour of the `ramsync` binary

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

fn ramsync() -> Command {
    Command::cargo_bin("ramsync").expect("ramsync binary")
}

/// Disk tree, memory location and a config file pointing at both
fn workspace() -> TempDir {
    let temp = TempDir::new().expect("tempdir");
    temp.child("disk/a.txt").write_str("alpha").expect("write");
    temp.child("disk/sub/b.txt").write_str("beta").expect("write");

    let config = serde_json::json!({
        "manager": { "backend": "directory" },
        "volumes": [{
            "name": "vol",
            "disk_path": temp.child("disk").path(),
            "ram_path": temp.child("ram").path(),
            "size_mb": 16
        }]
    });
    temp.child("ramsync.json")
        .write_str(&config.to_string())
        .expect("write config");
    temp
}

fn with_config(temp: &TempDir) -> Command {
    let mut cmd = ramsync();
    cmd.arg("--config").arg(temp.child("ramsync.json").path());
    cmd
}

#[test]
fn diff_lists_categories() {
    let temp = TempDir::new().expect("tempdir");
    temp.child("left/same.txt").write_str("same").expect("write");
    temp.child("left/changed.txt").write_str("v2").expect("write");
    temp.child("left/new.txt").write_str("new").expect("write");
    temp.child("right/same.txt").write_str("same").expect("write");
    temp.child("right/changed.txt").write_str("v1").expect("write");
    temp.child("right/gone.txt").write_str("gone").expect("write");

    ramsync()
        .arg("diff")
        .arg(temp.child("left").path())
        .arg(temp.child("right").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("+ new.txt"))
        .stdout(predicate::str::contains("- gone.txt"))
        .stdout(predicate::str::contains("~ changed.txt"))
        .stdout(predicate::str::contains(
            "1 added, 1 removed, 1 modified, 1 unchanged (4 paths)",
        ));
}

#[test]
fn diff_json_honours_patterns() {
    let temp = TempDir::new().expect("tempdir");
    temp.child("left/keep.txt").write_str("x").expect("write");
    temp.child("left/skip.bin").write_str("x").expect("write");
    temp.child("right/.keep").touch().expect("touch");

    let output = ramsync()
        .arg("diff")
        .arg(temp.child("left").path())
        .arg(temp.child("right").path())
        .args(["--pattern", "*.txt", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["added"], serde_json::json!(["keep.txt"]));
    assert_eq!(value["removed"], serde_json::json!([]));
}

#[test]
fn diff_missing_tree_fails() {
    let temp = TempDir::new().expect("tempdir");
    temp.child("left/a.txt").write_str("a").expect("write");

    ramsync()
        .arg("diff")
        .arg(temp.child("left").path())
        .arg(temp.child("absent").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to fingerprint"));
}

#[test]
fn volume_commands_need_a_config() {
    ramsync()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config is required"));
}

#[test]
fn unknown_volume_fails() {
    let temp = workspace();
    with_config(&temp)
        .args(["sync", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not registered"));
}

#[test]
fn sync_then_verify() {
    let temp = workspace();

    with_config(&temp)
        .args(["sync", "vol"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"))
        .stdout(predicate::str::contains("\"direction\": \"disk_to_ram\""));
    temp.child("ram/sub/b.txt").assert("beta");

    with_config(&temp)
        .args(["verify", "vol"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"verified_count\": 2"));

    temp.child("ram/a.txt").write_str("tampered").expect("write");
    with_config(&temp)
        .args(["verify", "vol"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("a.txt"));
}

#[test]
fn sync_to_disk_persists_memory_edits() {
    let temp = workspace();
    with_config(&temp).args(["sync", "vol"]).assert().success();
    temp.child("ram/c.txt").write_str("gamma").expect("write");

    with_config(&temp)
        .args(["sync", "vol", "--direction", "to-disk"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"direction\": \"ram_to_disk\""));
    temp.child("disk/c.txt").assert("gamma");
}

#[test]
fn shutdown_then_recover() {
    let temp = workspace();
    with_config(&temp).args(["sync", "vol"]).assert().success();

    with_config(&temp)
        .args(["shutdown", "vol"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"marker_written\": true"));
    temp.child("disk/.ram_disk_clean_shutdown")
        .assert(predicate::path::exists());

    // clean and intact: nothing to do, marker consumed
    with_config(&temp)
        .args(["recover", "vol"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recovery_needed\": false"));
    temp.child("disk/.ram_disk_clean_shutdown")
        .assert(predicate::path::missing());

    // no marker now, so the next activation counts as a crash
    with_config(&temp)
        .args(["recover", "vol"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recovery_needed\": true"));
}

#[test]
fn status_json_reports_volumes() {
    let temp = workspace();
    with_config(&temp).args(["sync", "vol"]).assert().success();

    let output = with_config(&temp)
        .args(["status", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value[0]["name"], "vol");
    assert_eq!(value[0]["sync"]["in_sync"], true);
    assert_eq!(value[0]["recovery"]["disk_path_exists"], true);
}

#[test]
fn status_text() {
    let temp = workspace();
    with_config(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backends: directory"))
        .stdout(predicate::str::contains("vol"))
        .stdout(predicate::str::contains("(missing)"))
        .stdout(predicate::str::contains("recovery needed: yes"));
}
