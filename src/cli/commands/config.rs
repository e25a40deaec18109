//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file given by `--config`.
    Validate,
    /// Print configuration with defaults filled in.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the config command against the file at `config`.
pub fn run_config(args: ConfigArgs, config: &Path) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(config),
        ConfigCommand::Show { format } => show_config(config, &format),
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }
    let config = Config::from_file(path)?;
    println!("✓ Configuration is valid");
    println!("  node:   {} ({})", config.node.node_id, config.node.endpoint);
    println!("  stream: {}", config.stream.name);
    Ok(())
}

fn show_config(path: &Path, format: &str) -> Result<()> {
    let config = Config::from_file(path)?;
    let rendered = match format {
        "json" => serde_json::to_string_pretty(&config)?,
        _ => toml::to_string_pretty(&config).context("failed to render config")?,
    };
    println!("{}", rendered);
    Ok(())
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = generate_template();
    match output {
        Some(path) => {
            std::fs::write(path, &template)?;
            println!("Generated config template: {:?}", path);
        }
        None => println!("{}", template),
    }
    Ok(())
}

fn generate_template() -> String {
    r#"# MessageVault Configuration

[node]
node_id = "node-1"
endpoint = "127.0.0.1:8001"

[election]
lease_ttl_ms = 15000
renew_interval_ms = 5000
retry_delay_ms = 1000
shutdown_grace_ms = 5000

[stream]
name = "default"
max_frame_size = 65536
mirror_cache = true

[storage]
cache_dir = "data/cache"
location_path = "data/leader.loc"

[telemetry]
log_level = "info"
"#
    .to_string()
}
