//! Executable path lookup for arbitrary PIDs.
//!
//! There is no portable way to ask the OS which binary another process is
//! running, so this is a capability with one implementation per target
//! family. Callers only rely on getting a string back, possibly empty.

use tracing::debug;

/// Resolves the executable path of a process by PID.
///
/// Implementations return an empty string when the answer is unavailable
/// (permissions, unsupported platform, process gone). An empty result is
/// "name unknown", never an error.
pub trait ExecutableLookup: Send + Sync {
    fn executable_path(&self, pid: i32) -> String;
}

/// The lookup for the platform this crate was built for.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformLookup;

impl ExecutableLookup for PlatformLookup {
    fn executable_path(&self, pid: i32) -> String {
        if pid <= 0 {
            return String::new();
        }
        platform_executable_path(pid)
    }
}

#[cfg(target_os = "linux")]
fn platform_executable_path(pid: i32) -> String {
    match std::fs::read_link(format!("/proc/{pid}/exe")) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(e) => {
            // exe is unreadable for other users' processes; stat is not
            debug!("readlink /proc/{pid}/exe failed: {e}");
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Ok(stat) => command_name_from_stat(&stat).unwrap_or_default(),
                Err(e) => {
                    debug!("Failed to read process name for {pid}: {e}");
                    String::new()
                }
            }
        }
    }
}

#[cfg(target_os = "macos")]
fn platform_executable_path(pid: i32) -> String {
    let mut buf = vec![0u8; libc::PROC_PIDPATHINFO_MAXSIZE as usize];
    // SAFETY: buf is writable for the length passed in.
    let len = unsafe {
        libc::proc_pidpath(
            pid,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len() as u32,
        )
    };
    if len <= 0 {
        debug!(
            "proc_pidpath({pid}) failed: {}",
            std::io::Error::last_os_error()
        );
        return String::new();
    }
    buf.truncate(len as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_executable_path(pid: i32) -> String {
    debug!("No executable lookup on this platform (pid {pid})");
    String::new()
}

/// Pull the command name out of a `/proc/<pid>/stat` line.
///
/// The name sits between the first `(` and the *last* `)`, since the name
/// itself may contain parentheses.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn command_name_from_stat(stat: &str) -> Option<String> {
    let start = stat.find('(')? + 1;
    let end = stat.rfind(')')?;
    if end < start {
        return None;
    }
    Some(stat[start..end].to_string())
}
