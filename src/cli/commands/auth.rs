//! Auth command implementation.

use crate::api::auth::{Access, AuthData};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// User and claim store operations.
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

/// Auth subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Write the default document with one administrator.
    Init {
        /// Output file path; prints to stdout when absent.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check whether a user may access a stream.
    Check {
        /// Auth document path.
        #[arg(short, long)]
        file: PathBuf,
        /// Login.
        #[arg(long)]
        login: String,
        /// Password.
        #[arg(long)]
        password: String,
        /// Stream name.
        #[arg(long)]
        stream: String,
        /// Require write access instead of read access.
        #[arg(long)]
        write: bool,
    },
}

/// Run the auth command.
pub fn run_auth(args: AuthArgs) -> Result<()> {
    match args.command {
        AuthCommand::Init { output } => {
            let document = AuthData::with_default_admin().serialize()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, document)?;
                    println!("Wrote default auth document: {:?}", path);
                }
                None => println!("{}", document),
            }
            Ok(())
        }
        AuthCommand::Check {
            file,
            login,
            password,
            stream,
            write,
        } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read auth document {:?}", file))?;
            let data = AuthData::deserialize(&source).context("failed to parse auth document")?;
            let access = if write { Access::Write } else { Access::Read };
            let Some(user) = data.authenticate(&login, &password) else {
                anyhow::bail!("authentication failed for '{}'", login);
            };
            if !user.has_claim(&stream, access) {
                anyhow::bail!("'{}' has no {:?} claim on '{}'", login, access, stream);
            }
            println!("✓ '{}' may {:?} '{}'", login, access, stream);
            Ok(())
        }
    }
}
