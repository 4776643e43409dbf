//! Heuristics for "was this process started as a daemon?"

use super::identity::ProcessIdentity;

/// Classifies a process as daemonized or not.
///
/// Swap in another rule for containers with a custom init, or service
/// managers that are not PID 1.
pub trait DaemonPolicy: Send + Sync {
    fn is_daemon(&self, identity: &ProcessIdentity, parent: Option<&ProcessIdentity>) -> bool;
}

/// The classic guess: a daemon is any of
/// - a child of init (its launcher exited and it was reparented),
/// - exactly one PID above its parent (the exec-replace pattern),
/// - a fork of a parent running the same program.
#[derive(Debug, Clone, Copy)]
pub struct InitParentHeuristic {
    pub init_pid: i32,
}

impl Default for InitParentHeuristic {
    fn default() -> Self {
        Self { init_pid: 1 }
    }
}

impl DaemonPolicy for InitParentHeuristic {
    fn is_daemon(&self, identity: &ProcessIdentity, parent: Option<&ProcessIdentity>) -> bool {
        let Some(ppid) = identity.parent_pid() else {
            return false;
        };

        ppid == self.init_pid
            || ppid.checked_add(1) == Some(identity.pid())
            || parent.is_some_and(|p| identity.is_fork_of(p))
    }
}
