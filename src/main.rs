//! Codemend: healing pipeline for generated quiz-skill code.
//!
//! This is the main entry point for the `codemend` CLI. It parses arguments,
//! installs the log subscriber, dispatches to the appropriate command
//! handler, and handles errors with proper exit codes.

mod ablation;
mod cli;
mod commands;
pub mod config;
pub mod contract;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod generation;
pub mod heal;
pub mod metrics;
pub mod prompt;
pub mod sandbox;
pub mod skill;

use cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "codemend=info",
        1 => "codemend=debug",
        _ => "codemend=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 0)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match commands::dispatch(cli.command, cli.config).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
