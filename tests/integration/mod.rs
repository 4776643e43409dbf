//! End-to-end tests driving the `warden` binary.
//!
//! Every test gets its own run directory through `WARDEN_RUN_DIR`, so the
//! lock files never collide with a real installation.

mod lifecycle;
mod respawn;

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// A scratch run directory plus a way to invoke the binary against it.
pub struct Harness {
    pub run_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            run_dir: TempDir::new().unwrap(),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.run_dir.path().join("warden.pid")
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_warden"));
        command
            .env("WARDEN_RUN_DIR", self.run_dir.path())
            .env("WARDEN_FALLBACK_DIR", self.run_dir.path())
            .env("WARDEN_LOG", "discard")
            .env_remove("WARDEN_CONFIG")
            .env_remove("WARDEN_WORK_SECS")
            .env_remove("WARDEN_RESPAWN_DELAY_MS");
        command
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command().args(args).output().unwrap()
    }

    pub fn lock_pid(&self) -> Option<i32> {
        read_pid(&self.lock_path())
    }

    /// Wait for the lock to name a PID.
    pub fn wait_for_lock(&self) -> Option<i32> {
        poll_until(|| self.lock_pid())
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // don't leave a daemon behind if an assertion failed midway
        if let Some(pid) = self.lock_pid() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid),
                nix::sys::signal::Signal::SIGKILL,
            );
        }
    }
}

pub fn read_pid(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub fn poll_until<T>(mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + POLL_TIMEOUT;
    loop {
        if let Some(value) = check() {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
