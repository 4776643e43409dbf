//! Command line verbs.
//! Usage: warden start [fork|nofork] [lock|nolock] | stop | restart | status | respawn [fork|nofork]

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use crate::supervisor::{
    ResidentService, RespawnOutcome, StartOptions, StartOutcome, StopOutcome, Supervisor,
};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Run this program as its own supervised background service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Start the service (forks into the background by default)
    Start {
        #[arg(value_enum, default_value_t = ForkMode::Fork)]
        fork: ForkMode,

        #[arg(value_enum, default_value_t = LockMode::Lock)]
        lock: LockMode,
    },

    /// Stop the running service and wait for it to exit
    Stop,

    /// Stop, then start forked with a lock
    Restart,

    /// Report whether the service is running
    Status,

    /// Keep the service running, relaunching it whenever it exits
    Respawn {
        #[arg(value_enum, default_value_t = ForkMode::Fork)]
        fork: ForkMode,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkMode {
    Fork,
    Nofork,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Lock,
    Nolock,
}

/// Execute a verb against `supervisor`.
///
/// # Returns
/// The process exit code. Only `stop` with nothing to stop, and failures to
/// launch, exit non-zero. `status` always exits 0.
pub fn execute(command: Commands, supervisor: &Supervisor) -> anyhow::Result<ExitCode> {
    let name = supervisor.service_name().to_string();

    match command {
        Commands::Start { fork, lock } => {
            let options = StartOptions {
                fork: fork == ForkMode::Fork,
                lock: lock == LockMode::Lock,
            };
            match supervisor.start(options)? {
                StartOutcome::Resident(service) => {
                    serve(service, supervisor.config().work_duration());
                }
                outcome => report_start(&name, &outcome),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stop => Ok(report_stop(&name, supervisor.stop())),
        Commands::Restart => {
            let outcome = supervisor.restart()?;
            report_start(&name, &outcome);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let state = supervisor.status();
            if state.is_running() {
                println!("  {} {name} is {state}", "●".green().bold());
            } else {
                println!("  {} {name} is {state}", "○".dimmed());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Respawn { fork } => {
            match supervisor.respawn(fork == ForkMode::Fork)? {
                RespawnOutcome::AlreadyRunning(pid) => {
                    println!("  {} {name} is already running (pid {pid})", "•".yellow());
                }
                RespawnOutcome::Forked(pid) => {
                    println!("  {} Started {name} supervisor (pid {pid})", "✓".green().bold());
                }
                RespawnOutcome::Finished { .. } => {}
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report_start(name: &str, outcome: &StartOutcome) {
    match outcome {
        StartOutcome::AlreadyRunning(pid) => {
            println!("  {} {name} is already running (pid {pid})", "•".yellow());
        }
        StartOutcome::Forked(pid) => {
            println!("  {} Started {name} (pid {pid})", "✓".green().bold());
        }
        StartOutcome::Resident(_) => {}
    }
}

fn report_stop(name: &str, outcome: StopOutcome) -> ExitCode {
    match outcome {
        StopOutcome::Stopped(pid) => {
            println!("  {} Stopped {name} (pid {pid})", "✓".green().bold());
            ExitCode::SUCCESS
        }
        StopOutcome::NotRunning => {
            println!("  {} {name} is not running", "✗".red().bold());
            ExitCode::FAILURE
        }
        StopOutcome::SignalFailed(pid) => {
            println!("  {} Could not signal {name} (pid {pid})", "✗".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// The demo workload: stay resident until signalled, or for `work` if set.
fn serve(service: ResidentService, work: Option<Duration>) {
    info!("Hello from pid {}", service.pid());

    let notice = service.shutdown_notice();
    match work {
        Some(duration) => {
            notice.wait_timeout(duration);
        }
        None => notice.wait(),
    }

    info!("Work finished, exiting");
}
