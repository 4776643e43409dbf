//! File-backed record of which PID owns a service.
//!
//! The lock is a plain file, `<dir>/<service>.pid`, holding one decimal PID.
//! There is no OS-level locking: readers treat anything they cannot parse,
//! or a PID that is no longer running, as "no owner" and remove it.

use crate::config::Config;
use crate::error::LockError;
use crate::process::is_process_alive;
use nix::unistd::geteuid;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Pick the directory that holds lock files.
///
/// `run_dir` is used only when the effective user owns it. Otherwise the
/// shared `fallback_dir` is used, which is world-writable on most systems:
/// weaker, but start/stop never fail just because we are not root.
pub fn directory_for(run_dir: &Path, fallback_dir: &Path) -> PathBuf {
    let euid = geteuid().as_raw();
    match fs::metadata(run_dir) {
        Ok(meta) if meta.is_dir() && meta.uid() == euid => run_dir.to_path_buf(),
        Ok(_) => {
            debug!(
                "{} is not owned by uid {euid}, using {}",
                run_dir.display(),
                fallback_dir.display()
            );
            fallback_dir.to_path_buf()
        }
        Err(e) => {
            debug!("Cannot stat {}: {e}, using {}", run_dir.display(), fallback_dir.display());
            fallback_dir.to_path_buf()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PidLock {
    service_name: String,
    path: PathBuf,
}

impl PidLock {
    /// Lock for `service_name` in the directory chosen by [`directory_for`].
    pub fn for_service(service_name: &str, config: &Config) -> Self {
        let dir = directory_for(&config.run_dir, &config.fallback_dir);
        Self::in_dir(service_name, &dir)
    }

    pub fn in_dir(service_name: &str, dir: &Path) -> Self {
        Self {
            service_name: service_name.to_string(),
            path: dir.join(format!("{service_name}.pid")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Record `pid` as the owner, replacing any previous contents.
    ///
    /// The data is synced to disk before returning.
    pub fn set(&self, pid: i32) -> Result<(), LockError> {
        let io_err = |source| LockError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(pid.to_string().as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        debug!("Wrote pid {pid} to {}", self.path.display());
        Ok(())
    }

    /// Read the recorded PID without side effects.
    ///
    /// # Returns
    /// * `Ok(None)` - No lock file
    /// * `Ok(Some(pid))` - A well-formed PID
    /// * `Err(_)` - Unreadable, or not a positive decimal integer
    pub fn read(&self) -> Result<Option<i32>, LockError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LockError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(LockError::Corrupt {
                path: self.path.clone(),
                contents,
            }),
        }
    }

    /// The recorded PID, healing a corrupt lock by removing it.
    ///
    /// Does not check whether the PID is running; see [`PidLock::live_owner`].
    pub fn get(&self) -> Option<i32> {
        match self.read() {
            Ok(pid) => pid,
            Err(e) => {
                warn!("{e}; clearing it");
                self.clear();
                None
            }
        }
    }

    /// The recorded PID if that process is still running.
    ///
    /// A lock naming a dead process is stale and gets removed.
    pub fn live_owner(&self) -> Option<i32> {
        let pid = self.get()?;
        if is_process_alive(pid) {
            return Some(pid);
        }
        info!("Clearing stale lock for {} (pid {pid} is gone)", self.service_name);
        self.clear();
        None
    }

    /// Remove the lock file. Missing is fine.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove lock file {}: {e}", self.path.display()),
        }
    }

    /// Remove the lock only if it still names `pid`.
    ///
    /// Used on shutdown so an exiting instance never removes a lock that a
    /// newer instance has since written.
    pub fn clear_if_owned(&self, pid: i32) -> bool {
        match self.read() {
            Ok(Some(owner)) if owner == pid => {
                self.clear();
                true
            }
            Ok(Some(owner)) => {
                debug!("Lock now belongs to pid {owner}, leaving it");
                false
            }
            Ok(None) => false,
            Err(e) => {
                debug!("Not clearing lock: {e}");
                false
            }
        }
    }
}
