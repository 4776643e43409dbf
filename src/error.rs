//! Error types for the supervisor and its PID lock.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that end a supervisor operation.
///
/// Lock-file problems are not listed here. They are logged and the
/// operation carries on without a lock (see [`LockError`]).
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The OS cannot tell us which executable we are. Nothing else can work.
    #[error("unable to determine the current executable: {0}")]
    EnvironmentUnavailable(#[source] io::Error),

    /// The executable to fork or respawn could not be found or exec'd.
    #[error("failed to launch {}: {source}", path.display())]
    TargetLaunchFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures reading or writing the PID lock file.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("lock file {} holds unparsable contents {contents:?}", path.display())]
    Corrupt { path: PathBuf, contents: String },
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
