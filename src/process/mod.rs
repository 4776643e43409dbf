//! Process identity and liveness.
//!
//! This module answers "who am I", "who is my parent" and "is that PID
//! still around" for the supervisor.

mod identity;
mod lookup;
mod policy;

pub use identity::{short_name_of, ProcessIdentity};
pub use lookup::{ExecutableLookup, PlatformLookup};
pub use policy::{DaemonPolicy, InitParentHeuristic};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Check if a process with the given PID is alive
///
/// Sends the null signal, which performs the existence and permission checks
/// without delivering anything.
///
/// # Returns
/// * `false` - The OS reports no such process, or the process has finished
///   and is only waiting to be reaped
/// * `true` - Anything else, including errors we cannot interpret. A false
///   "dead" would make the supervisor start a second copy.
pub fn is_process_alive(pid: i32) -> bool {
    // 0 and negative values address process groups, not a process
    if pid <= 0 {
        return false;
    }

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => !is_finished(pid),
        Err(Errno::ESRCH) => false,
        Err(Errno::EPERM) => {
            debug!("Process {pid} exists but belongs to another user");
            true
        }
        Err(e) => {
            warn!("Liveness probe for process {pid} failed: {e}; treating as alive");
            true
        }
    }
}

/// A zombie still answers the null signal but has already exited.
#[cfg(target_os = "linux")]
fn is_finished(pid: i32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| process_state(&stat))
        .is_some_and(|state| state == 'Z' || state == 'X')
}

#[cfg(not(target_os = "linux"))]
fn is_finished(_pid: i32) -> bool {
    false
}

/// The state letter that follows the command name in `/proc/<pid>/stat`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn process_state(stat: &str) -> Option<char> {
    let after_name = &stat[stat.rfind(')')? + 1..];
    after_name.trim_start().chars().next()
}
