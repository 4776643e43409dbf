//! Who a process is: PID, parent, and the executable it runs.

use super::lookup::ExecutableLookup;
use super::policy::DaemonPolicy;
use super::is_process_alive;
use crate::error::{Result, SupervisorError};
use nix::unistd::{getpid, getppid};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot of a process's identity.
///
/// Built from live OS calls and never updated; if the process changes,
/// resolve a new one. The parent PID is only known for the current process,
/// since reading it for anyone else needs more introspection than we have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pid: i32,
    parent_pid: Option<i32>,
    short_name: String,
    full_name: String,
    path: PathBuf,
}

impl ProcessIdentity {
    /// Identity of the calling process.
    ///
    /// Fails only if the OS cannot report our own executable path.
    pub fn resolve_current() -> Result<Self> {
        let exe = std::env::current_exe().map_err(SupervisorError::EnvironmentUnavailable)?;
        Ok(Self::from_executable(
            getpid().as_raw(),
            Some(getppid().as_raw()),
            &exe,
        ))
    }

    /// Best-effort identity of an arbitrary PID.
    ///
    /// If `lookup` cannot name the executable the identity is still usable,
    /// with empty name fields.
    pub fn resolve_by_pid(pid: i32, lookup: &dyn ExecutableLookup) -> Self {
        let exe = lookup.executable_path(pid);
        let parent_pid = (pid == getpid().as_raw()).then(|| getppid().as_raw());
        Self::from_executable(pid, parent_pid, Path::new(&exe))
    }

    /// Build an identity from already-known facts.
    ///
    /// A symlinked executable is named after its target.
    pub fn from_executable(pid: i32, parent_pid: Option<i32>, exe: &Path) -> Self {
        let exe = follow_symlink(exe);
        let full_name = exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = exe.parent().map(Path::to_path_buf).unwrap_or_default();

        Self {
            pid,
            parent_pid,
            short_name: short_name_of(&full_name).to_string(),
            full_name,
            path,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn parent_pid(&self) -> Option<i32> {
        self.parent_pid
    }

    /// Executable name with any `-<version>` suffix removed
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Directory holding the executable
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of the executable, if its name is known
    pub fn executable(&self) -> Option<PathBuf> {
        (!self.full_name.is_empty()).then(|| self.path.join(&self.full_name))
    }

    pub fn is_current(&self) -> bool {
        self.pid == getpid().as_raw()
    }

    /// Resolve our parent. `None` for anything but the current process.
    pub fn parent(&self, lookup: &dyn ExecutableLookup) -> Option<ProcessIdentity> {
        self.parent_pid
            .map(|ppid| ProcessIdentity::resolve_by_pid(ppid, lookup))
    }

    pub fn is_live(&self) -> bool {
        is_process_alive(self.pid)
    }

    /// True when `parent` spawned us and runs the same program.
    ///
    /// Unknown names never match, so two unnamed processes are not forks of
    /// each other.
    pub fn is_fork_of(&self, parent: &ProcessIdentity) -> bool {
        self.parent_pid == Some(parent.pid)
            && !self.short_name.is_empty()
            && self.short_name == parent.short_name
    }

    /// Best-effort guess at whether we were started as a daemon.
    ///
    /// This is a classification aid, not a security check.
    pub fn is_daemon(&self, policy: &dyn DaemonPolicy, lookup: &dyn ExecutableLookup) -> bool {
        let parent = self.parent(lookup);
        policy.is_daemon(self, parent.as_ref())
    }
}

/// Strip a trailing `-<anything>` version tag from an executable name.
///
/// `service-2.1.0` becomes `service`. The suffix is not validated, so a
/// name that is nothing but a suffix (`-x`) comes back empty.
pub fn short_name_of(full_name: &str) -> &str {
    match full_name.rfind('-') {
        Some(idx) => &full_name[..idx],
        None => full_name,
    }
}

fn follow_symlink(exe: &Path) -> PathBuf {
    let is_link = fs::symlink_metadata(exe)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return exe.to_path_buf();
    }

    match fs::read_link(exe) {
        Ok(target) if target.is_relative() => exe
            .parent()
            .map(|dir| dir.join(&target))
            .unwrap_or(target),
        Ok(target) => target,
        Err(e) => {
            debug!("Failed to read symlink {}: {e}", exe.display());
            exe.to_path_buf()
        }
    }
}
