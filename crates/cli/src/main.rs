//! # Smartmeter CLI
//!
//! Command line entry point.
//!
//! - configuration loading and validation
//! - pipeline orchestration and lifecycle
//! - graceful shutdown on Ctrl+C / SIGTERM

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_upload, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let overrides = cli.log_overrides();

    // `run` installs logging itself once the config is loaded
    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args, overrides).await,
        Commands::Validate(args) => {
            init_console_logging(overrides)?;
            run_validate(args)
        }
        Commands::Info(args) => {
            init_console_logging(overrides)?;
            run_info(args)
        }
        Commands::Upload(args) => {
            init_console_logging(overrides)?;
            run_upload(args).await
        }
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Stdout only logging for the offline commands
fn init_console_logging(overrides: observability::LogOverrides) -> Result<()> {
    let logging = contracts::LoggingConfig {
        log_to_stdout: true,
        ..Default::default()
    };
    let overrides = observability::LogOverrides {
        no_file: true,
        ..overrides
    };
    observability::init_logging(&logging, &overrides)?;
    Ok(())
}
