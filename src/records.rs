use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use dialoguer::Confirm;

use crate::args::BaseArgs;
use crate::context;
use crate::device_sync::SyncError;
use crate::ui::{is_interactive, with_spinner};

#[derive(Debug, Clone, Args)]
pub struct RecordsArgs {
    #[command(subcommand)]
    command: RecordsCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum RecordsCommands {
    /// Push a single record to every terminal
    Push(PushArgs),
    /// Remove all records from every terminal
    Clear(ClearArgs),
}

#[derive(Debug, Clone, Args)]
struct PushArgs {
    /// Record identifier
    #[arg(value_name = "RECORD_ID")]
    record_id: String,
}

#[derive(Debug, Clone, Args)]
struct ClearArgs {
    /// Skip confirmation
    #[arg(long, short = 'f')]
    force: bool,
}

pub async fn run(base: BaseArgs, args: RecordsArgs) -> Result<()> {
    let settings = context::resolve(&base)?;
    let ctl = context::controller(&settings)?;

    match args.command {
        RecordsCommands::Push(push) => {
            let record_id = push.record_id.trim();
            if record_id.is_empty() {
                bail!("record id must not be empty");
            }
            let outcome = with_spinner(
                "Pushing record...",
                ctl.start_single_record_sync(record_id),
            )
            .await?;
            if base.json {
                println!("{}", serde_json::to_string(&outcome)?);
            }
            if !outcome.success {
                bail!("record {record_id} was not accepted by the terminals");
            }
            Ok(())
        }
        RecordsCommands::Clear(clear) => {
            // A clear racing a running batch would wipe records mid-push.
            if ctl.sync_running() {
                return Err(SyncError::AttemptActive.into());
            }

            if !clear.force {
                if !is_interactive() {
                    bail!("refusing to clear device records without confirmation. Use: devsync records clear --force");
                }
                let confirm = Confirm::new()
                    .with_prompt("Remove all records from every check-in terminal?")
                    .default(false)
                    .interact()?;
                if !confirm {
                    return Ok(());
                }
            }

            let outcome = with_spinner(
                "Clearing device records...",
                ctl.clear_device_records(),
            )
            .await?;
            if base.json {
                println!("{}", serde_json::to_string(&outcome)?);
            }
            if !outcome.success {
                bail!("the sync service could not clear device records");
            }
            Ok(())
        }
    }
}
