/// CLI commands and entry point implementation.
/// This module handles command-line argument parsing and dispatches execution
/// to the appropriate command handlers.
use crate::cli::args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod args;
pub mod commands;

/// Initializes the logging system for the CLI.
/// Supports dynamic log level configuration via the `log_level` parameter.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive(log_level.parse().unwrap_or_default());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    tracing::debug!("Logging initialized with level: {}", log_level);
}

/// Parses command-line arguments and executes the requested command.
/// This is the main entry point for the controller binary.
pub async fn run() -> crate::error::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    tracing::info!("starting command: {:?}", cli.command);

    match cli.command {
        Commands::Controller(args) => {
            tracing::info!("starting cluster controller with {} workers", args.workers);
            commands::handle_controller(args.workers, args.config).await?;
        }
    }

    tracing::info!("command execution completed successfully");
    Ok(())
}
