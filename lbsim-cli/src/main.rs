//! ## lbsim-cli
//! **Command-line entrypoint for the load-balancer simulator**
//!
//! `lbsim run` replays the configured trace through a worker pool and prints
//! utilization status lines while it runs. `lbsim check-trace` only parses a
//! trace and reports what it found.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

mod commands;
mod error;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match commands::run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("lbsim: {e}");
            ExitCode::FAILURE
        }
    }
}
