//! The respawn loop, run in the foreground so the test owns the supervisor.

use super::{poll_until, Harness};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::thread;
use std::time::Duration;

#[test]
fn test_respawn_relaunches_until_terminated() {
    let harness = Harness::new();

    // each launch finishes straight away, so the loop keeps going
    let child = harness
        .command()
        .args(["respawn", "nofork"])
        .env("WARDEN_LOG", "stderr")
        .env("WARDEN_WORK_SECS", "0")
        .env("WARDEN_RESPAWN_DELAY_MS", "50")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let supervisor = child.id() as i32;

    let owner = harness.wait_for_lock().expect("supervisor never wrote its lock");
    assert_eq!(owner, supervisor);

    thread::sleep(Duration::from_millis(500));
    kill(Pid::from_raw(supervisor), Signal::SIGTERM).unwrap();

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "supervisor failed: {output:?}");
    assert!(!harness.lock_path().exists());

    let stderr = String::from_utf8_lossy(&output.stderr);
    let launches = stderr.matches("Respawn iteration").count();
    assert!(launches >= 2, "expected repeated launches, got:\n{stderr}");
}

#[test]
fn test_no_launch_after_shutdown_begins() {
    // back-to-back launches make a relaunch racing the signal likely
    for _ in 0..5 {
        let harness = Harness::new();
        let child = harness
            .command()
            .args(["respawn", "nofork"])
            .env("WARDEN_LOG", "stderr")
            .env("WARDEN_WORK_SECS", "0")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let supervisor = child.id() as i32;

        harness.wait_for_lock().expect("supervisor never wrote its lock");
        thread::sleep(Duration::from_millis(100));
        kill(Pid::from_raw(supervisor), Signal::SIGTERM).unwrap();

        let output = child.wait_with_output().unwrap();
        assert!(output.status.success(), "supervisor failed: {output:?}");

        let stderr = String::from_utf8_lossy(&output.stderr);
        let marker = stderr
            .find("Respawn loop for warden stopping")
            .unwrap_or_else(|| panic!("no shutdown line in:\n{stderr}"));
        let late = stderr[marker..].matches("Respawn iteration").count();
        assert_eq!(late, 0, "relaunched after shutdown began:\n{stderr}");
    }
}

#[test]
fn test_respawn_fork_then_stop() {
    let harness = Harness::new();

    let output = harness.run(&["respawn"]);
    assert!(output.status.success(), "respawn failed: {output:?}");

    let owner = harness.wait_for_lock().expect("supervisor never wrote its lock");

    // a forking start sees the supervisor and does nothing
    let output = harness.run(&["start"]);
    assert!(output.status.success());
    assert_eq!(harness.lock_pid(), Some(owner));

    assert!(harness.run(&["stop"]).status.success());
    assert!(poll_until(|| (!harness.lock_path().exists()).then_some(())).is_some());
}
