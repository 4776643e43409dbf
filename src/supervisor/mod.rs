//! Supervisor verbs: start, stop, restart, status, respawn.
//!
//! A managed service has no in-memory state between invocations. Its state
//! is whatever the PID lock and the process table say:
//!
//! | lock      | PID       | state       |
//! |-----------|-----------|-------------|
//! | absent    | -         | `Unmanaged` |
//! | present   | live      | `Running`   |
//! | present   | dead      | stale, cleared to `Unmanaged` on first look |
//!
//! The executable built on this supervisor must accept the verbs produced
//! here (`start nofork lock|nolock`, `respawn nofork`), since forking means
//! re-running ourselves with those arguments.

mod lifecycle;
mod respawn;
mod signals;
mod wait;

pub use lifecycle::{ResidentService, StartOptions, StartOutcome};
pub use respawn::RespawnOutcome;
#[cfg(test)]
pub(crate) use lifecycle::resident_args;
#[cfg(test)]
pub(crate) use respawn::RESPAWN_CHILD_ARGS;
pub use signals::ShutdownNotice;

use crate::config::Config;
use crate::error::Result;
use crate::pid_lock::PidLock;
use crate::process::{
    is_process_alive, DaemonPolicy, ExecutableLookup, InitParentHeuristic, PlatformLookup,
    ProcessIdentity,
};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{error, info, warn};

/// Name used for the lock when the executable's own name is unknown
const FALLBACK_SERVICE_NAME: &str = "service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running(i32),
    Unmanaged,
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceState::Running(_))
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Running(pid) => write!(f, "running (pid {pid})"),
            ServiceState::Unmanaged => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process was signalled and has exited
    Stopped(i32),
    /// No lock, or the lock named a dead process
    NotRunning,
    /// The process is alive but refused our signal (usually EPERM)
    SignalFailed(i32),
}

pub struct Supervisor {
    config: Config,
    identity: ProcessIdentity,
    lock: PidLock,
    lookup: Box<dyn ExecutableLookup>,
    policy: Box<dyn DaemonPolicy>,
}

impl Supervisor {
    /// Supervisor for the current executable.
    ///
    /// Fails only with `EnvironmentUnavailable`.
    pub fn new(config: Config) -> Result<Self> {
        let identity = ProcessIdentity::resolve_current()?;
        Ok(Self::with_identity(config, identity))
    }

    pub fn with_identity(config: Config, identity: ProcessIdentity) -> Self {
        let service_name = match identity.short_name() {
            "" => FALLBACK_SERVICE_NAME,
            name => name,
        };
        let lock = PidLock::for_service(service_name, &config);
        let policy = InitParentHeuristic {
            init_pid: config.init_pid,
        };

        Self {
            config,
            identity,
            lock,
            lookup: Box::new(PlatformLookup),
            policy: Box::new(policy),
        }
    }

    pub fn with_lookup(mut self, lookup: impl ExecutableLookup + 'static) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    pub fn with_policy(mut self, policy: impl DaemonPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    pub fn lock(&self) -> &PidLock {
        &self.lock
    }

    pub fn service_name(&self) -> &str {
        self.lock.service_name()
    }

    pub fn is_daemon(&self) -> bool {
        self.identity
            .is_daemon(self.policy.as_ref(), self.lookup.as_ref())
    }

    /// Who owns the service right now. Clears a stale lock as a side effect.
    pub fn status(&self) -> ServiceState {
        match self.lock.live_owner() {
            Some(pid) => ServiceState::Running(pid),
            None => ServiceState::Unmanaged,
        }
    }

    /// Ask the running instance to terminate and wait for it to exit.
    ///
    /// Blocks without a timeout once the signal has been delivered.
    pub fn stop(&self) -> StopOutcome {
        let name = self.service_name();

        let Some(pid) = self.lock.get() else {
            info!("{name} is not running");
            return StopOutcome::NotRunning;
        };

        if !is_process_alive(pid) {
            info!("{name} is not running (clearing stale lock for pid {pid})");
            self.lock.clear();
            return StopOutcome::NotRunning;
        }

        let target = ProcessIdentity::resolve_by_pid(pid, self.lookup.as_ref());
        if !target.short_name().is_empty() && target.short_name() != self.identity.short_name() {
            warn!(
                "Lock for {name} names pid {pid}, which runs {}",
                target.full_name()
            );
        }

        info!("Stopping {name} (pid {pid})");
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                info!("{name} exited before it could be signalled");
                self.lock.clear_if_owned(pid);
                return StopOutcome::NotRunning;
            }
            Err(e) => {
                error!("Failed to signal pid {pid}: {e}");
                return StopOutcome::SignalFailed(pid);
            }
        }

        wait::wait_for_exit(pid);
        self.lock.clear_if_owned(pid);
        info!("Stopped {name} (pid {pid})");
        StopOutcome::Stopped(pid)
    }

    /// `stop`, then a forking, locking `start`.
    pub fn restart(&self) -> Result<StartOutcome> {
        self.stop();
        self.start(StartOptions {
            fork: true,
            lock: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::{Child, Command};
    use std::thread;
    use tempfile::TempDir;

    fn supervisor_in(temp_dir: &TempDir) -> Supervisor {
        let config = Config {
            run_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let identity = ProcessIdentity::from_executable(
            std::process::id() as i32,
            None,
            Path::new("/usr/local/bin/svc-1.0.0"),
        );
        Supervisor::with_identity(config, identity)
    }

    fn spawn_sleeper() -> Child {
        Command::new("sleep").arg("30").spawn().unwrap()
    }

    #[test]
    fn test_lock_named_after_short_name() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);
        assert_eq!(sup.service_name(), "svc");
        assert_eq!(sup.lock().path(), temp_dir.path().join("svc.pid"));
    }

    #[test]
    fn test_unknown_name_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            run_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let identity = ProcessIdentity::from_executable(1, None, Path::new(""));
        let sup = Supervisor::with_identity(config, identity);
        assert_eq!(sup.service_name(), FALLBACK_SERVICE_NAME);
    }

    #[test]
    fn test_bare_suffix_name_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            run_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let identity = ProcessIdentity::from_executable(1, None, Path::new("/usr/bin/-x"));
        let sup = Supervisor::with_identity(config, identity);
        assert_eq!(sup.service_name(), FALLBACK_SERVICE_NAME);
        assert_eq!(sup.lock().path(), temp_dir.path().join("service.pid"));
    }

    #[test]
    fn test_status_unmanaged_without_lock() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);
        assert_eq!(sup.status(), ServiceState::Unmanaged);
        assert!(!sup.status().is_running());
    }

    #[test]
    fn test_status_running_for_live_pid() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);
        let me = std::process::id() as i32;
        sup.lock().set(me).unwrap();

        assert_eq!(sup.status(), ServiceState::Running(me));
        assert_eq!(sup.status().to_string(), format!("running (pid {me})"));
        assert!(sup.lock().path().exists());
    }

    #[test]
    fn test_status_clears_stale_lock() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);
        sup.lock().set(999_999_999).unwrap();

        assert_eq!(sup.status(), ServiceState::Unmanaged);
        assert!(!sup.lock().path().exists());
    }

    #[test]
    fn test_stop_without_lock() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);
        assert_eq!(sup.stop(), StopOutcome::NotRunning);
    }

    #[test]
    fn test_stop_with_stale_lock() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);
        sup.lock().set(999_999_999).unwrap();

        assert_eq!(sup.stop(), StopOutcome::NotRunning);
        assert!(!sup.lock().path().exists());
    }

    #[test]
    fn test_stop_terminates_and_clears() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);

        let mut child = spawn_sleeper();
        let pid = child.id() as i32;
        sup.lock().set(pid).unwrap();
        let reaper = thread::spawn(move || child.wait());

        assert_eq!(sup.stop(), StopOutcome::Stopped(pid));
        assert!(!sup.lock().path().exists());

        let status = reaper.join().unwrap().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_stop_keeps_newer_owner() {
        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir);

        let mut child = spawn_sleeper();
        let pid = child.id() as i32;
        sup.lock().set(pid).unwrap();

        // a newer instance takes the lock as soon as the old one is gone
        let lock = sup.lock().clone();
        let reaper = thread::spawn(move || {
            let status = child.wait();
            lock.set(999_999_998).unwrap();
            status
        });

        // whichever of the swap and our cleanup runs first, the newer
        // owner's lock must survive
        let outcome = sup.stop();
        reaper.join().unwrap().unwrap();
        assert!(matches!(outcome, StopOutcome::Stopped(p) if p == pid));
        assert_eq!(sup.lock().read().unwrap(), Some(999_999_998));
    }

    #[test]
    fn test_is_daemon_uses_policy() {
        struct Always;
        impl DaemonPolicy for Always {
            fn is_daemon(&self, _: &ProcessIdentity, _: Option<&ProcessIdentity>) -> bool {
                true
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let sup = supervisor_in(&temp_dir).with_policy(Always);
        assert!(sup.is_daemon());
    }
}
