//! Waiting for a process we did not spawn.
//!
//! `waitpid` only works on our own children. For anything else Linux offers
//! a pidfd, which becomes readable when the process exits; elsewhere we
//! fall back to probing liveness.

use crate::process::is_process_alive;
use std::thread;
use std::time::Duration;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Block until `pid` has exited. There is no timeout.
pub(crate) fn wait_for_exit(pid: i32) {
    #[cfg(target_os = "linux")]
    match pidfd::wait(pid) {
        Ok(()) => return,
        Err(e) => debug!("pidfd wait for {pid} unavailable ({e}), polling instead"),
    }

    poll_until_gone(pid);
}

fn poll_until_gone(pid: i32) {
    while is_process_alive(pid) {
        thread::sleep(POLL_INTERVAL);
    }
    debug!("Process {pid} is gone");
}

#[cfg(target_os = "linux")]
mod pidfd {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

    pub(super) fn wait(pid: i32) -> io::Result<()> {
        // SAFETY: pidfd_open(pid, flags) returns a new descriptor or -1.
        let raw = unsafe { libc::syscall(libc::SYS_pidfd_open, pid as libc::pid_t, 0 as libc::c_uint) };
        if raw < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        // SAFETY: raw is a fresh descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw as RawFd) };

        let mut pfd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            // SAFETY: pfd is a single valid pollfd for the duration of the call.
            let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
            if rc > 0 {
                return Ok(());
            }
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
        }
    }
}
