//! MessageVault - unified CLI entrypoint.
//!
//! Usage:
//!   messagevault start --config config/messagevault.toml
//!   messagevault config validate --config config/messagevault.toml
//!   messagevault inspect checkpoint --stream orders
//!   messagevault inspect cache --folder data/cache --stream orders
//!   messagevault leader --location data/leader.loc
//!   messagevault auth init --output auth.json

use anyhow::Result;
use clap::Parser;
use messagevault::cli::commands::{
    run_auth, run_config, run_inspect, run_leader, run_start_with_config,
};
use messagevault::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine config path - use global --config or default
    let explicit = cli.config.is_some();
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/messagevault.toml"));

    match cli.command {
        Commands::Start(args) => {
            run_start_with_config(&config_path, explicit, args, cli.log_level).await
        }
        Commands::Config(args) => run_config(args, &config_path),
        Commands::Inspect(args) => run_inspect(args),
        Commands::Leader(args) => run_leader(args).await,
        Commands::Auth(args) => run_auth(args),
    }
}
