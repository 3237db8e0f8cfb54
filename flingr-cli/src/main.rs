//! # flingr
//!
//! Makes this machine's SFTP service reachable from the internet and
//! publishes where it can be found.
//!
//! ## Commands
//!
//! - `connect`: Map ports, start sshd, register; disconnect on Ctrl+C
//! - `locate`: Find (optionally install) the sshd executable
//! - `lookup`: Read a published record by id
//!
//! ## Example
//!
//! ```bash
//! # Connect using flingr.toml in the current directory
//! flingr connect
//!
//! # Manual endpoint, serve a directory, no registration
//! flingr connect --local-address 192.168.1.10 --external-port 51413 --root D:\share --no-register
//!
//! # On the remote side
//! flingr lookup abc123
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use commands::{connect, locate, lookup, Components};
use config::Config;

/// Command-line front end for Flingr connectivity.
#[derive(Parser, Debug)]
#[command(name = "flingr")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = "flingr.toml")]
    config: PathBuf,

    /// Log filter when RUST_LOG is unset (e.g. `debug`, `flingr_client=trace`)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and stay connected until Ctrl+C
    Connect {
        /// LAN address to use (selects manual mode)
        #[arg(long)]
        local_address: Option<String>,

        /// Gateway port to open (manual mode; random when absent)
        #[arg(long)]
        external_port: Option<u32>,

        /// Directory served over SFTP
        #[arg(long)]
        root: Option<PathBuf>,

        /// Do not publish to the rendezvous store
        #[arg(long)]
        no_register: bool,
    },

    /// Locate the daemon executable
    Locate {
        /// Install the daemon if it cannot be found
        #[arg(long)]
        install: bool,
    },

    /// Look up a published record
    Lookup {
        /// Registration id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "config file not found; using defaults");
        Config::default()
    };
    let working_dir = std::env::current_dir().context("Failed to read working directory")?;

    match cli.command {
        Commands::Connect {
            local_address,
            external_port,
            root,
            no_register,
        } => {
            if local_address.is_some() {
                config.connection.local_address = local_address;
            }
            if external_port.is_some() {
                config.connection.external_port = external_port;
            }
            if root.is_some() {
                config.connection.root_directory = root;
            }
            if no_register {
                config.connection.register = false;
            }
            let components = Components::from_config(&config, &working_dir)?;
            connect::run(&config, components, shutdown_signal()).await?;
        }
        Commands::Locate { install } => {
            let components = Components::from_config(&config, &working_dir)?;
            locate::run(&config, components, install).await?;
        }
        Commands::Lookup { id } => {
            let components = Components::from_config(&config, &working_dir)?;
            lookup::run(&components.rendezvous, &id).await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C (or SIGTERM on unix).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
