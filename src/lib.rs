//! warden: turn a foreground executable into its own supervised background
//! service.
//!
//! The executable forks a detached copy of itself, tracks it through a PID
//! lock file, turns termination signals into a clean exit, and can keep the
//! service alive with a respawn loop. No init system is involved.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pid_lock;
pub mod process;
pub mod supervisor;

pub use config::Config;
pub use error::{LockError, SupervisorError};
pub use pid_lock::PidLock;
pub use process::ProcessIdentity;
pub use supervisor::{
    ResidentService, RespawnOutcome, ServiceState, StartOptions, StartOutcome, StopOutcome,
    Supervisor,
};
