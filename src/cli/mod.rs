//! Command-line interface.
//!
//! Unified CLI for MessageVault operations.

pub mod commands;

use clap::{Parser, Subcommand};

/// MessageVault - append-only event log with a lease-elected writer.
#[derive(Parser, Debug)]
#[command(name = "messagevault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a MessageVault node.
    Start(commands::StartArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Inspect local caches.
    Inspect(commands::InspectArgs),
    /// Show the published leader endpoint.
    Leader(commands::LeaderArgs),
    /// User and claim store operations.
    Auth(commands::AuthArgs),
}
