//! Inspect command implementation.

use crate::storage::cache::{cache_paths, CheckpointedCacheReader};
use crate::storage::checkpoint::DurableCheckpointReader;
use crate::storage::frame::ChainAssembler;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Inspect local caches.
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub command: InspectCommand,
}

/// Inspect subcommands.
#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// List the frames of a stream's cache.
    Cache {
        /// Cache folder holding one subfolder per stream.
        #[arg(short, long, default_value = "data/cache")]
        folder: PathBuf,
        /// Stream name.
        #[arg(short, long)]
        stream: String,
        /// Cache position to start from.
        #[arg(long, default_value_t = 0)]
        start: u64,
        /// Maximum number of frames to list.
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Reassemble and print complete messages instead of frames.
        #[arg(long)]
        messages: bool,
    },
    /// Print a stream's durable checkpoint.
    Checkpoint {
        /// Cache folder holding one subfolder per stream.
        #[arg(short, long, default_value = "data/cache")]
        folder: PathBuf,
        /// Stream name.
        #[arg(short, long)]
        stream: String,
    },
}

/// Run the inspect command.
pub fn run_inspect(args: InspectArgs) -> Result<()> {
    match args.command {
        InspectCommand::Cache {
            folder,
            stream,
            start,
            limit,
            messages,
        } => inspect_cache(&folder, &stream, start, limit, messages),
        InspectCommand::Checkpoint { folder, stream } => {
            let (_, checkpoint) = cache_paths(&folder, &stream);
            let vector = DurableCheckpointReader::open(&checkpoint)
                .and_then(|r| r.read())
                .with_context(|| format!("failed to read checkpoint {:?}", checkpoint))?;
            println!("local_flushed: {}", vector.local_flushed);
            println!("origin_cached: {}", vector.origin_cached);
            println!("origin_max:    {}", vector.origin_max);
            Ok(())
        }
    }
}

fn inspect_cache(
    folder: &Path,
    stream: &str,
    start: u64,
    limit: usize,
    messages: bool,
) -> Result<()> {
    let mut reader = CheckpointedCacheReader::open_standalone(folder, stream)
        .with_context(|| format!("failed to open cache of stream '{}'", stream))?;
    let bulk = reader.read_all_bulk(start, limit)?;

    if messages {
        let mut chain = ChainAssembler::new();
        for record in bulk.records {
            if let Some(message) = chain.push(record.frame)? {
                println!(
                    "{:>12}  {:<24} {} bytes",
                    record.current_cache_position,
                    message.key,
                    message.value.len()
                );
            }
        }
        if chain.pending() > 0 {
            println!("({} frames of an unterminated chain)", chain.pending());
        }
    } else {
        for record in &bulk.records {
            println!(
                "{:>12}  {:<24} {:?} {} bytes",
                record.current_cache_position,
                record.frame.key,
                record.frame.flags,
                record.frame.payload.len()
            );
        }
    }

    let stats = bulk.stats;
    println!();
    println!(
        "read {} records, {} -> {} of {} (origin {}/{})",
        stats.read_records,
        stats.starting_cache_position,
        stats.current_cache_position,
        stats.available_cache_position,
        stats.cached_origin_position,
        stats.max_origin_position
    );
    if stats.read_end_of_cache_before_it_was_flushed {
        println!("stopped at a record that was not fully flushed");
    }
    Ok(())
}
