use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use warden::cli::{self, Cli};
use warden::{logging, Config, Supervisor};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("warden: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let supervisor = match Supervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            eprintln!("warden: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&supervisor.config().log, supervisor.service_name()) {
        eprintln!("warden: logging disabled: {e:#}");
    }

    match cli::execute(cli.command, &supervisor) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("warden: {e:#}");
            ExitCode::FAILURE
        }
    }
}
