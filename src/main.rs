use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use tracing_subscriber::EnvFilter;

mod args;
mod batches;
mod config;
mod context;
mod device_sync;
mod env;
mod http;
mod records;
mod sync;
mod ui;
mod utils;

use crate::args::CLIArgs;

const CLI_VERSION: &str = env!("DEVSYNC_VERSION_STRING");

#[derive(Debug, Parser)]
#[command(
    name = "devsync",
    about = "Push volunteer records to check-in terminals",
    version = CLI_VERSION
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start, follow, cancel and retry device sync batches
    Sync(CLIArgs<sync::SyncArgs>),
    /// Push or clear individual device records
    Records(CLIArgs<records::RecordsArgs>),
    /// Browse past sync batches
    Batches(CLIArgs<batches::BatchesArgs>),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DEVSYNC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let env_files = env::bootstrap_from_args(&argv)?;
    init_tracing();
    for file in &env_files {
        tracing::debug!(path = %file.display(), "loaded env file");
    }
    let cli = Cli::parse_from(argv);

    match cli.command {
        Commands::Sync(cmd) => sync::run(cmd.base, cmd.args).await?,
        Commands::Records(cmd) => records::run(cmd.base, cmd.args).await?,
        Commands::Batches(cmd) => batches::run(cmd.base, cmd.args).await?,
    }

    Ok(())
}
