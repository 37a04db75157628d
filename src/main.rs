//! # shelfsync CLI Application
//!
//! Main entry point for the shelfsync directory synchronization utility.
//! One side serves a directory, the other pulls it; both prove knowledge of
//! a shared password and everything after the handshake is encrypted.

use anyhow::Result;
use clap::Parser;
use colored::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfsync::cli::{self, Cli, Commands};

/// Main entry point for the shelfsync application.
///
/// This function sets up logging, parses command line arguments, and dispatches
/// to the appropriate command handler based on user input.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config;
    if let Err(e) = match cli.command {
        Commands::Init => cli::init(config).await,
        Commands::Serve { directory, bind, port, password } => {
            cli::serve(config, directory, bind, port, password).await
        }
        Commands::Pull { directory, server, strict, exclude, exclude_patterns, password } => {
            cli::pull(config, directory, server, strict, exclude, exclude_patterns, password).await
        }
    } {
        eprintln!(
            "{} {}\n{}",
            "Error:".red().bold(),
            e.to_string().red(),
            "Tip: Run with --help for usage information.".yellow()
        );
        std::process::exit(1);
    }
    Ok(())
}
