//! start / status / stop / restart through the real binary.

use super::{poll_until, stdout_of, Harness};
use warden::process::is_process_alive;

#[test]
fn test_status_when_never_started() {
    let harness = Harness::new();
    let output = harness.run(&["status"]);

    assert!(output.status.success());
    assert!(stdout_of(&output).contains("stopped"));
    assert!(!harness.lock_path().exists());
}

#[test]
fn test_stop_without_lock_fails() {
    let harness = Harness::new();
    let output = harness.run(&["stop"]);

    assert!(!output.status.success());
    assert!(stdout_of(&output).contains("not running"));
}

#[test]
fn test_stale_lock_is_cleared_by_status() {
    let harness = Harness::new();
    std::fs::write(harness.lock_path(), "999999999").unwrap();

    let output = harness.run(&["status"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("stopped"));
    assert!(!harness.lock_path().exists());
}

#[test]
fn test_start_status_stop() {
    let harness = Harness::new();

    let output = harness.run(&["start"]);
    assert!(output.status.success(), "start failed: {output:?}");

    let pid = harness.wait_for_lock().expect("daemon never wrote its lock");
    assert!(is_process_alive(pid));

    let output = harness.run(&["status"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains(&format!("running (pid {pid})")));

    // a second start leaves the running instance alone
    let output = harness.run(&["start"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("already running"));
    assert_eq!(harness.lock_pid(), Some(pid));

    let output = harness.run(&["stop"]);
    assert!(output.status.success(), "stop failed: {output:?}");
    assert!(!harness.lock_path().exists());
}

#[test]
fn test_restart_replaces_instance() {
    let harness = Harness::new();

    assert!(harness.run(&["start"]).status.success());
    let first = harness.wait_for_lock().expect("daemon never wrote its lock");

    let output = harness.run(&["restart"]);
    assert!(output.status.success(), "restart failed: {output:?}");

    let second = poll_until(|| harness.lock_pid().filter(|pid| *pid != first))
        .expect("restarted daemon never wrote its lock");
    assert!(is_process_alive(second));

    assert!(harness.run(&["stop"]).status.success());
    assert!(!harness.lock_path().exists());
}

#[test]
fn test_nolock_start_leaves_no_lock() {
    let harness = Harness::new();

    let output = harness
        .command()
        .args(["start", "nofork", "nolock"])
        .env("WARDEN_WORK_SECS", "0")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(!harness.lock_path().exists());
}

#[test]
fn test_resident_start_clears_own_lock_on_finish() {
    let harness = Harness::new();

    let output = harness
        .command()
        .args(["start", "nofork", "lock"])
        .env("WARDEN_WORK_SECS", "0")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(!harness.lock_path().exists());
}
