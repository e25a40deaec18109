//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start a MessageVault node.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Override the node id.
    #[arg(long)]
    pub node_id: Option<String>,

    /// Override the endpoint published when leader.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Override the cache directory.
    #[arg(long)]
    pub cache_dir: Option<String>,
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // a second init (e.g. from tests) is not an error
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

/// Run the start command with the given config path.
///
/// A missing config file at the default location falls back to defaults.
pub async fn run_start_with_config(
    config_path: &Path,
    explicit: bool,
    args: StartArgs,
    log_level: Option<String>,
) -> Result<()> {
    let mut config = if config_path.exists() || explicit {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load config from {:?}", config_path))?
    } else {
        Config::default()
    };

    config.apply_overrides(&ConfigOverrides {
        log_level,
        node_id: args.node_id,
        endpoint: args.endpoint,
        cache_dir: args.cache_dir,
    });
    config.validate().context("invalid configuration")?;

    init_tracing(&config.telemetry.log_level);
    if !config_path.exists() {
        tracing::warn!(path = %config_path.display(), "config file not found, using defaults");
    }

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
