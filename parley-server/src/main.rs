#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Command line entry point for the Parley server.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::server::Config;
use std::path::PathBuf;

#[cfg(test)]
mod main_tests;

/// Main CLI structure for the Parley server
#[derive(Debug, Parser)]
#[command(name = "parley")]
#[command(about = "Direct messaging backend with live presence", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP and WebSocket server
    Serve {
        /// Port to bind, overriding the config file and environment
        #[arg(long, short)]
        port: u16,

        /// Configuration file (.yaml, .yml, .json or .toml)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// Loads configuration for `serve` and runs the server until shutdown.
///
/// # Errors
/// Returns an error if configuration loading or server startup fails.
pub async fn handle_serve_command(port: u16, config: Option<PathBuf>) -> anyhow::Result<()> {
    let resolved_config = Config::load_config(config, Some(port))?;
    server::server::run(resolved_config).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
    }
}
