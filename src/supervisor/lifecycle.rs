//! Starting a service: fork a detached copy, or become the service.

use super::signals::{self, ShutdownNotice};
use super::{ServiceState, Supervisor};
use crate::error::{Result, SupervisorError};
use crate::pid_lock::PidLock;
use crate::process::is_process_alive;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

/// Arguments the forked child is started with
pub(crate) fn resident_args(lock: bool) -> [&'static str; 3] {
    ["start", "nofork", if lock { "lock" } else { "nolock" }]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Spawn a detached copy and return, instead of running here
    pub fork: bool,
    /// Record the running instance's PID in the lock
    pub lock: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            fork: true,
            lock: true,
        }
    }
}

#[derive(Debug)]
pub enum StartOutcome {
    /// A live instance already owns the lock; nothing was spawned
    AlreadyRunning(i32),
    /// A detached child was spawned. It registers itself in the lock.
    Forked(i32),
    /// This process is now the service
    Resident(ResidentService),
}

/// The running (non-forking) side of `start`.
///
/// A termination signal clears the lock and exits the process with status 0.
/// If the service instead finishes on its own, dropping this clears the
/// lock, provided it still names us.
#[must_use = "dropping the service releases its lock"]
#[derive(Debug)]
pub struct ResidentService {
    pid: i32,
    lock: Option<PidLock>,
    notice: ShutdownNotice,
}

impl ResidentService {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Fires when a termination signal has been received.
    pub fn shutdown_notice(&self) -> &ShutdownNotice {
        &self.notice
    }
}

impl Drop for ResidentService {
    fn drop(&mut self) {
        if let Some(lock) = &self.lock {
            lock.clear_if_owned(self.pid);
        }
    }
}

impl Supervisor {
    /// Start the service.
    ///
    /// With `fork`, a running instance makes this a no-op; otherwise a stale
    /// lock is cleared and a detached `start nofork` child is spawned. The
    /// child writes its own PID, so the parent never has to guess it.
    ///
    /// Without `fork`, this process becomes the service: it installs the
    /// termination listener, registers itself if `lock` is set, and returns
    /// immediately.
    pub fn start(&self, options: StartOptions) -> Result<StartOutcome> {
        let name = self.service_name();

        if options.fork {
            if let ServiceState::Running(pid) = self.status() {
                info!("{name} is already running (pid {pid})");
                return Ok(StartOutcome::AlreadyRunning(pid));
            }

            let pid = self.spawn_detached(&resident_args(options.lock))?;
            info!("Started {name} (pid {pid})");
            return Ok(StartOutcome::Forked(pid));
        }

        let pid = self.identity().pid();
        let lock = options.lock.then(|| self.lock().clone());

        let notice = {
            let lock = lock.clone();
            signals::install(move || {
                if let Some(lock) = &lock {
                    lock.clear_if_owned(pid);
                }
                std::process::exit(0);
            })
        };

        if options.lock {
            self.register(pid);
        }
        info!(
            "{name} running (pid {pid}, daemon: {})",
            self.is_daemon()
        );

        Ok(StartOutcome::Resident(ResidentService { pid, lock, notice }))
    }

    /// Write `pid` into the lock, best effort.
    pub(super) fn register(&self, pid: i32) {
        if let Some(owner) = self.lock().get() {
            if owner != pid && is_process_alive(owner) {
                warn!(
                    "Taking over the {} lock from live pid {owner}",
                    self.service_name()
                );
            }
        }
        if let Err(e) = self.lock().set(pid) {
            warn!("{e}; continuing without a lock");
        }
    }

    /// The executable to re-run. Must still exist on disk.
    pub(super) fn target_executable(&self) -> Result<PathBuf> {
        let not_found = |path: PathBuf| SupervisorError::TargetLaunchFailure {
            path,
            source: io::Error::from(io::ErrorKind::NotFound),
        };

        let exe = self
            .identity()
            .executable()
            .ok_or_else(|| not_found(PathBuf::new()))?;
        if !exe.is_file() {
            return Err(not_found(exe));
        }
        Ok(exe)
    }

    /// Spawn ourselves with `args` in a new session, fully detached.
    ///
    /// Only waits for the fork/exec to complete, not for the child.
    pub(super) fn spawn_detached(&self, args: &[&str]) -> Result<i32> {
        let exe = self.target_executable()?;
        debug!("Spawning {} {:?}", exe.display(), args);

        let mut command = Command::new(&exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        new_session(&mut command);

        let child = command
            .spawn()
            .map_err(|source| SupervisorError::TargetLaunchFailure { path: exe, source })?;
        let pid = child.id() as i32;
        spawn_reaper_thread(child);
        Ok(pid)
    }
}

/// Put the child in its own session so it outlives us and ignores our
/// terminal's signals.
pub(super) fn new_session(command: &mut Command) {
    // SAFETY: setsid is async-signal-safe and runs in the child before exec.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(io::Error::from)
        });
    }
}

/// Spawn a background thread to reap a child process when it exits.
///
/// Prevents a zombie for as long as this process outlives the child.
fn spawn_reaper_thread(mut child: std::process::Child) {
    thread::spawn(move || {
        let _ = child.wait();
    });
}
