use anyhow::Result;
use clap::{Args, Subcommand};

use crate::args::BaseArgs;
use crate::context;

mod list;
mod view;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Args)]
pub struct BatchesArgs {
    #[command(subcommand)]
    command: Option<BatchesCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum BatchesCommands {
    /// List past sync batches
    List(ListArgs),
    /// Show one batch with its log
    View(ViewArgs),
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    /// Page to show, starting at 1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    page: u32,

    /// Batches per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..=200))]
    page_size: u32,
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct ViewArgs {
    /// Batch identifier
    #[arg(value_name = "BATCH_ID")]
    batch_id: String,
}

pub async fn run(base: BaseArgs, args: BatchesArgs) -> Result<()> {
    let settings = context::resolve(&base)?;
    let ctl = context::controller(&settings)?;

    match args.command {
        None => list::run(&ctl, &ListArgs::default(), base.json).await,
        Some(BatchesCommands::List(l)) => list::run(&ctl, &l, base.json).await,
        Some(BatchesCommands::View(v)) => view::run(&ctl, &v.batch_id, base.json).await,
    }
}
