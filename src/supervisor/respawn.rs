//! Respawn: keep relaunching the service until told to stop.
//!
//! The supervising process owns the lock. Each iteration runs the service
//! as `start nofork nolock` in its own session and waits for it to exit.

use super::lifecycle::{new_session, resident_args};
use super::signals::{self, ShutdownNotice};
use super::{ServiceState, Supervisor};
use crate::error::{Result, SupervisorError};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
#[cfg(target_os = "linux")]
use nix::sys::wait::{waitid, Id, WaitPidFlag};
use nix::unistd::Pid;
use std::io;
use std::process::{Child, Command, ExitStatus};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

pub(crate) const RESPAWN_CHILD_ARGS: [&str; 2] = ["respawn", "nofork"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnOutcome {
    AlreadyRunning(i32),
    /// A detached supervisor was spawned
    Forked(i32),
    /// The loop ended on a termination signal after this many launches
    Finished { launches: u64 },
}

/// The managed child currently running, shared with the signal listener.
#[derive(Debug, Default)]
struct ManagedChild {
    pid: Option<i32>,
    stopping: bool,
}

type SharedChild = Arc<Mutex<ManagedChild>>;

impl Supervisor {
    /// Run the service under a respawn loop.
    ///
    /// With `fork`, behaves like a forking `start` but the detached child is
    /// `respawn nofork`. Without `fork`, this process registers itself in the
    /// lock and relaunches the service every time it exits, until SIGINT,
    /// SIGTERM or SIGHUP arrives. The signal is forwarded to the running
    /// child and the loop exits once that child does, without launching
    /// another.
    ///
    /// A missing executable ends the loop with `TargetLaunchFailure`.
    pub fn respawn(&self, fork: bool) -> Result<RespawnOutcome> {
        let name = self.service_name();

        if fork {
            if let ServiceState::Running(pid) = self.status() {
                info!("{name} is already running (pid {pid})");
                return Ok(RespawnOutcome::AlreadyRunning(pid));
            }
            let pid = self.spawn_detached(&RESPAWN_CHILD_ARGS)?;
            info!("Started {name} supervisor (pid {pid})");
            return Ok(RespawnOutcome::Forked(pid));
        }

        let me = self.identity().pid();
        let child: SharedChild = Arc::default();

        let notice = {
            let lock = self.lock().clone();
            let child = Arc::clone(&child);
            let name = name.to_string();
            signals::install(move || {
                lock.clear_if_owned(me);
                {
                    // held across the decision so the loop can neither
                    // launch a new child nor reap the current one meanwhile
                    let mut slot = child.lock().unwrap_or_else(PoisonError::into_inner);
                    slot.stopping = true;
                    if let Some(pid) = slot.pid {
                        terminate(pid);
                    }
                }
                info!("Respawn loop for {name} stopping");
            })
        };

        self.register(me);
        info!("{name} supervisor running (pid {me})");

        let result = self.supervise(&notice, &child);
        self.lock().clear_if_owned(me);

        match &result {
            Ok(RespawnOutcome::Finished { launches }) => {
                info!("{name} supervisor exiting after {launches} launch(es)")
            }
            Ok(_) => {}
            Err(e) => error!("{name} supervisor stopped: {e}"),
        }
        result
    }

    fn supervise(&self, notice: &ShutdownNotice, child: &SharedChild) -> Result<RespawnOutcome> {
        let name = self.service_name();
        let delay = self.config().respawn_delay();
        let args = resident_args(false);
        let mut launches: u64 = 0;

        while !notice.is_signalled() {
            let (mut process, pid) = {
                let mut slot = child.lock().unwrap_or_else(PoisonError::into_inner);
                // the handler marks the slot before the notice fires
                if slot.stopping {
                    break;
                }

                let exe = self.target_executable()?;
                let mut command = Command::new(&exe);
                command.args(args);
                new_session(&mut command);
                let process = command
                    .spawn()
                    .map_err(|source| SupervisorError::TargetLaunchFailure { path: exe, source })?;
                launches += 1;

                let pid = process.id() as i32;
                info!("Respawn iteration {launches}: launched {name} (pid {pid})");
                slot.pid = Some(pid);
                (process, pid)
            };

            match wait_and_release(&mut process, child) {
                Ok(status) => info!("{name} (pid {pid}) exited: {status}"),
                Err(e) => warn!("Failed to wait for {name} (pid {pid}): {e}"),
            }

            if !delay.is_zero() {
                notice.wait_timeout(delay);
            }
        }

        Ok(RespawnOutcome::Finished { launches })
    }
}

/// Wait for the managed child and empty its slot.
///
/// On Linux the slot is emptied while the child is still an unreaped zombie,
/// so the handler can never signal a PID that has been handed to someone
/// else.
#[cfg(target_os = "linux")]
fn wait_and_release(process: &mut Child, child: &SharedChild) -> io::Result<ExitStatus> {
    wait_unreaped(process.id() as i32);
    child.lock().unwrap_or_else(PoisonError::into_inner).pid = None;
    process.wait()
}

#[cfg(not(target_os = "linux"))]
fn wait_and_release(process: &mut Child, child: &SharedChild) -> io::Result<ExitStatus> {
    // no WNOWAIT here: the slot is emptied right after the reap
    let status = process.wait();
    child.lock().unwrap_or_else(PoisonError::into_inner).pid = None;
    status
}

/// Block until our child `pid` has exited, leaving it unreaped.
#[cfg(target_os = "linux")]
fn wait_unreaped(pid: i32) {
    let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT;
    loop {
        match waitid(Id::Pid(Pid::from_raw(pid)), flags) {
            Ok(_) => return,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                debug!("waitid for pid {pid} failed: {e}");
                return;
            }
        }
    }
}

fn terminate(pid: i32) {
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => debug!("Forwarded SIGTERM to pid {pid}"),
        Err(Errno::ESRCH) => debug!("Pid {pid} already exited"),
        Err(e) => warn!("Failed to forward SIGTERM to pid {pid}: {e}"),
    }
}
