//! Leader command implementation.

use crate::election::location::{FileLocationRecord, LocationRecord};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Show the published leader endpoint.
#[derive(Args, Debug)]
pub struct LeaderArgs {
    /// Location record path.
    #[arg(short, long, default_value = "data/leader.loc")]
    pub location: PathBuf,
}

/// Run the leader command.
pub async fn run_leader(args: LeaderArgs) -> Result<()> {
    let record = FileLocationRecord::new(args.location);
    let leader = record
        .read()
        .await
        .with_context(|| format!("failed to read location record {:?}", record.path()))?;
    match leader {
        Some(endpoint) => println!("{}", endpoint),
        None => println!("no leader published"),
    }
    Ok(())
}
