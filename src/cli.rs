//! # Command Line Interface
//!
//! This module provides the command-line host for the sync core: argument
//! parsing, config resolution, password entry, and the three commands.
//!
//! ## Commands
//!
//! - `init` - Write a default configuration file
//! - `serve` - Serve a directory to exactly one peer, then exit
//! - `pull` - Pull a served directory into a local one

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::io::{BufRead, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::client::{PullOptions, SyncClient};
use crate::config::Config;
use crate::crypto::Credential;
use crate::protocol::DEFAULT_PORT;
use crate::server::{SessionEnd, SyncServer};

/// Command-line interface structure for shelfsync.
#[derive(Parser)]
#[command(name = "shelfsync")]
#[command(about = "Password-authenticated, encrypted peer-to-peer directory synchronization")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init,

    /// Serve a directory to one peer, then exit
    Serve {
        /// Directory to serve (created if missing)
        directory: PathBuf,
        /// Address to bind, e.g. 0.0.0.0
        #[arg(short, long)]
        bind: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Shared password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Pull a served directory into a local one
    Pull {
        /// Local directory to sync into (created if missing)
        directory: PathBuf,
        /// Server as HOST:PORT (port defaults to 1230)
        server: String,
        /// Delete local files the server does not have
        #[arg(short, long)]
        strict: bool,
        /// Relative path to leave untouched (repeatable)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,
        /// Glob pattern to leave untouched, e.g. '**/.DS_Store' (repeatable)
        #[arg(long = "exclude-pattern")]
        exclude_patterns: Vec<String>,
        /// Shared password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

pub async fn init(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::init(config_path.as_deref())?;
    info!("Configuration written to {}", config.config_path().display());

    println!("✅ Configuration written to {}", config.config_path().display());
    Ok(())
}

/// Serve `directory` to a single peer.
///
/// The blocking session runs on a worker thread. Ctrl+C while a peer is
/// connected shuts the socket down and the session ends in order; Ctrl+C
/// while still waiting for a peer exits immediately.
pub async fn serve(
    config_path: Option<PathBuf>,
    directory: PathBuf,
    bind: Option<String>,
    port: Option<u16>,
    password: Option<String>,
) -> Result<()> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.bind_address = bind;
    }

    let credential = Credential::new(&read_password(password)?);
    let server = SyncServer::bind(config.listen_addr(port).as_str(), credential)?;
    let handle = server.shutdown_handle();

    println!("📡 Serving {} on {}", directory.display(), server.local_addr()?);
    println!("   Waiting for a peer. Press Ctrl+C to stop.");

    let mut task = tokio::task::spawn_blocking(move || server.start(&directory));
    let report = tokio::select! {
        joined = &mut task => joined??,
        _ = tokio::signal::ctrl_c() => {
            if !handle.trigger() {
                println!("\n🛑 Stopped before a peer connected.");
                // The accept call cannot be woken, so leave without joining it.
                std::process::exit(130);
            }
            task.await??
        }
    };

    let outcome = match report.end {
        SessionEnd::Completed => "all files offered",
        SessionEnd::PeerClosed => "peer disconnected",
        SessionEnd::Interrupted => "interrupted",
    };
    println!(
        "✅ Session closed ({}): {} offered, {} sent, {} bytes",
        outcome, report.offered, report.sent, report.bytes_sent
    );
    Ok(())
}

pub async fn pull(
    config_path: Option<PathBuf>,
    directory: PathBuf,
    server: String,
    strict: bool,
    exclude: Vec<String>,
    exclude_patterns: Vec<String>,
    password: Option<String>,
) -> Result<()> {
    let config = Config::load(config_path.as_deref())?;

    let mut options = PullOptions {
        exclude_paths: config.exclude_paths,
        exclude_patterns: config.exclude_patterns,
        strict: strict || config.strict,
    };
    options.exclude_paths.extend(exclude);
    options.exclude_patterns.extend(exclude_patterns);

    let address = server_address(&server);
    let credential = Credential::new(&read_password(password)?);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Syncing {} from {}", directory.display(), address));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let target = directory.clone();
    let result = tokio::task::spawn_blocking(move || {
        SyncClient::new(credential).start(&target, address.as_str(), &options)
    })
    .await;
    spinner.finish_and_clear();
    let report = result??;

    if let Some(pruned) = &report.pruned {
        println!(
            "🧹 Removed {} stale file(s), {} empty folder(s)",
            pruned.files_removed.len(),
            pruned.dirs_removed
        );
    }
    for path in &report.received {
        println!("   Synced {}", path);
    }
    println!(
        "✅ {} up to date: {} received ({} bytes), {} unchanged, {} excluded",
        directory.display(),
        report.received.len(),
        report.bytes_received,
        report.skipped,
        report.excluded
    );
    Ok(())
}

/// Accept `host:port`, a bare host, or a bare IP, defaulting the port.
pub fn server_address(input: &str) -> String {
    let input = input.trim();
    if input.parse::<SocketAddr>().is_ok() {
        return input.to_string();
    }
    if let Ok(ip) = input.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    match input.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => input.to_string(),
        _ => format!("{}:{}", input, DEFAULT_PORT),
    }
}

/// Surrounding whitespace is dropped before the key is derived.
fn read_password(password: Option<String>) -> Result<String> {
    let password = match password {
        Some(password) => password,
        None => {
            eprint!("Enter password for encrypted syncing: ");
            std::io::stderr().flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };

    let password = password.trim();
    if password.is_empty() {
        anyhow::bail!("A password is required");
    }
    Ok(password.to_string())
}
