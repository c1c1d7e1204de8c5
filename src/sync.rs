use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use dialoguer::console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};

use crate::args::BaseArgs;
use crate::context::{self, CliController, Settings};
use crate::device_sync::{
    LogEntry, LogKind, PayloadEncoding, PollEvent, PollExit, Poller, ResumeOutcome, RetryMode,
    Strategy, SyncAttempt, SyncOptions, SyncStatus, TYPED_OPTION_KEYS,
};
use crate::ui::{
    apply_column_padding, header, print_command_status, styled_table, truncate, with_spinner,
    CommandStatus,
};
use crate::utils::{format_eta, format_u64_commas, RECORD};

const STATUS_LOG_TAIL: usize = 10;

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    #[command(subcommand)]
    command: SyncCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum SyncCommands {
    /// Start a device sync batch and follow its progress
    Start(StartArgs),
    /// Follow the sync already running for this session
    Watch,
    /// Show the current sync attempt
    Status,
    /// Stop watching the running sync
    Cancel(CancelArgs),
    /// Clear a finished or failed sync so a new one can be shown
    Dismiss,
    /// Resend only the records that failed in the last sync
    Retry(RetryArgs),
}

#[derive(Debug, Clone, Args)]
struct StartArgs {
    /// Which records the server should include
    #[arg(long, value_enum, default_value_t = Strategy::All)]
    strategy: Strategy,

    /// Photo payload encoding to request
    #[arg(long, value_enum)]
    photo_encoding: Option<PayloadEncoding>,

    /// Ask the server to validate records before pushing them
    #[arg(long)]
    validate_first: bool,

    /// Extra option forwarded to the sync service (repeatable)
    #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    options: Vec<(String, Value)>,

    /// Return once the server accepts the batch instead of following it
    #[arg(long)]
    detach: bool,
}

#[derive(Debug, Clone, Args)]
struct CancelArgs {
    /// Also ask the sync service to halt the job (best effort)
    #[arg(long)]
    abort: bool,
}

#[derive(Debug, Clone, Args)]
struct RetryArgs {
    /// Resend with the fallback photo encoding
    #[arg(long)]
    fallback_encoding: bool,

    /// Return once the server accepts the retry instead of following it
    #[arg(long)]
    detach: bool,
}

pub async fn run(base: BaseArgs, args: SyncArgs) -> Result<()> {
    let settings = context::resolve(&base)?;
    let mut ctl = context::controller(&settings)?;
    report_resume(ctl.resume_from_persistence());

    match args.command {
        SyncCommands::Start(start_args) => start(&mut ctl, start_args, base.json).await,
        SyncCommands::Watch => watch(&mut ctl, &settings, base.json).await,
        SyncCommands::Status => status(&ctl, &settings, base.json),
        SyncCommands::Cancel(cancel_args) => cancel(&mut ctl, cancel_args).await,
        SyncCommands::Dismiss => dismiss(&mut ctl),
        SyncCommands::Retry(retry_args) => retry(&mut ctl, retry_args, base.json).await,
    }
}

fn report_resume(outcome: ResumeOutcome) {
    match outcome {
        ResumeOutcome::Stale => print_command_status(
            CommandStatus::Warning,
            "The saved sync for this session is more than 10 minutes old and was discarded",
        ),
        ResumeOutcome::Discarded => print_command_status(
            CommandStatus::Warning,
            "The saved sync state was unreadable and was discarded",
        ),
        ResumeOutcome::Resumed | ResumeOutcome::Restored | ResumeOutcome::Nothing => {}
    }
}

async fn start(ctl: &mut CliController, args: StartArgs, json: bool) -> Result<()> {
    let options = SyncOptions {
        photo_encoding: args.photo_encoding,
        validate_first: args.validate_first,
        extra: args.options.into_iter().collect::<Map<String, Value>>(),
    };

    with_spinner(
        "Starting device sync...",
        ctl.start_full_sync(args.strategy, options),
    )
    .await
    .context("device sync did not start")?;

    after_launch(ctl, args.detach, json).await
}

async fn retry(ctl: &mut CliController, args: RetryArgs, json: bool) -> Result<()> {
    let records = ctl
        .retryable_records()
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let mode = if args.fallback_encoding {
        RetryMode::FallbackEncoding
    } else {
        RetryMode::Original
    };

    with_spinner("Starting retry...", ctl.retry_failed(&records, mode))
        .await
        .context("retry did not start")?;

    after_launch(ctl, args.detach, json).await
}

async fn after_launch(ctl: &mut CliController, detach: bool, json: bool) -> Result<()> {
    if !detach {
        return follow(ctl, json).await;
    }

    if json {
        println!("{}", serde_json::to_string(ctl.attempt())?);
    } else {
        let id = ctl.attempt().attempt_id.as_deref().unwrap_or("pending");
        print_command_status(
            CommandStatus::Success,
            &format!("Device sync started (batch {id})"),
        );
        eprintln!("Run `devsync sync watch` to follow it.");
    }
    Ok(())
}

async fn watch(ctl: &mut CliController, settings: &Settings, json: bool) -> Result<()> {
    if ctl.attempt().is_syncing() {
        return follow(ctl, json).await;
    }

    if json {
        println!("{}", serde_json::to_string(ctl.attempt())?);
        return Ok(());
    }
    match ctl.attempt().status {
        SyncStatus::Completed | SyncStatus::Error => print_status(ctl.attempt(), settings),
        SyncStatus::Idle | SyncStatus::Syncing => print_command_status(
            CommandStatus::Info,
            &format!("No device sync is running for session '{}'", settings.session),
        ),
    }
    Ok(())
}

fn status(ctl: &CliController, settings: &Settings, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(ctl.attempt())?);
    } else {
        print_status(ctl.attempt(), settings);
    }
    Ok(())
}

async fn cancel(ctl: &mut CliController, args: CancelArgs) -> Result<()> {
    ctl.cancel()?;

    if !args.abort {
        print_command_status(
            CommandStatus::Success,
            "Stopped watching the device sync. The server may still finish the batch.",
        );
        return Ok(());
    }

    match with_spinner("Asking the sync service to stop...", ctl.request_abort()).await {
        Ok(()) => print_command_status(
            CommandStatus::Success,
            "Stopped watching the device sync and asked the server to halt it",
        ),
        Err(err) => print_command_status(
            CommandStatus::Warning,
            &format!("Stopped watching, but the abort request failed: {err}"),
        ),
    }
    Ok(())
}

fn dismiss(ctl: &mut CliController) -> Result<()> {
    ctl.dismiss(false)?;
    print_command_status(CommandStatus::Success, "Cleared the finished sync");
    Ok(())
}

async fn follow(ctl: &mut CliController, json: bool) -> Result<()> {
    let poller = Poller::new(ctl.policy().poll_interval);
    let threshold = ctl.policy().failure_threshold;
    let mut view = ProgressView::new(ctl.attempt(), threshold, json);

    let exit = poller
        .run(ctl, interrupted(), |attempt, event| view.update(attempt, event))
        .await;
    view.finish();

    match exit {
        PollExit::Detached => {
            print_command_status(
                CommandStatus::Info,
                "Stopped following; the sync keeps running on the server.",
            );
            eprintln!("Run `devsync sync watch` within 10 minutes to pick it up again.");
            Ok(())
        }
        PollExit::Settled(status) => {
            if json {
                println!("{}", serde_json::to_string(ctl.attempt())?);
            } else if let Some(failed) = ctl.retryable_records() {
                eprintln!(
                    "{} failed. Run `devsync sync retry` (or `--fallback-encoding`) to resend {}.",
                    RECORD.counted(failed.len()),
                    if failed.len() == 1 { "it" } else { "them" }
                );
            }
            match status {
                SyncStatus::Error => Err(anyhow!("device sync stopped with an error")),
                _ => Ok(()),
            }
        }
    }
}

/// Resolves on Ctrl+C. If the handler cannot be installed it never resolves.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::debug!(error = %err, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

struct ProgressView {
    bar: ProgressBar,
    printed_logs: usize,
    threshold: u32,
}

impl ProgressView {
    fn new(attempt: &SyncAttempt, threshold: u32, json: bool) -> Self {
        let bar = if json || !std::io::stderr().is_terminal() {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(attempt.counters.total);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix} [{bar:40.cyan/blue}] {pos}/{len} records ({percent:>3}%) | {msg}",
                )
                .unwrap()
                .progress_chars("=> "),
            );
            pb.set_prefix("Syncing devices");
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        };

        let mut view = Self {
            bar,
            printed_logs: 0,
            threshold,
        };
        view.update(attempt, PollEvent::Progress);
        view
    }

    fn update(&mut self, attempt: &SyncAttempt, event: PollEvent) {
        if attempt.logs.len() < self.printed_logs {
            self.printed_logs = attempt.local_log_len.min(attempt.logs.len());
        }
        for entry in &attempt.logs[self.printed_logs..] {
            self.print_line(&format_log(entry));
        }
        self.printed_logs = attempt.logs.len();

        let counters = &attempt.counters;
        self.bar.set_length(counters.total);
        self.bar.set_position(counters.settled().min(counters.total));

        let message = match event {
            PollEvent::Failed { consecutive } => format!(
                "progress check failed ({consecutive}/{}), retrying",
                self.threshold
            ),
            _ => format!(
                "{} sent, {} failed | ETA {}",
                format_u64_commas(counters.sent),
                format_u64_commas(counters.failed),
                format_eta(attempt.timing.estimated_time_remaining)
            ),
        };
        self.bar.set_message(message);
    }

    fn print_line(&self, line: &str) {
        if self.bar.is_hidden() {
            eprintln!("{line}");
        } else {
            self.bar.println(line);
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn format_log(entry: &LogEntry) -> String {
    let tag = match entry.kind {
        LogKind::Info => style("info").dim(),
        LogKind::Success => style("ok").green(),
        LogKind::Warning => style("warn").yellow(),
        LogKind::Error => style("error").red(),
    };
    format!("{} {:>5} {}", style(&entry.time).dim(), tag, entry.message)
}

fn print_status(attempt: &SyncAttempt, settings: &Settings) {
    let status = match attempt.status {
        SyncStatus::Syncing => style(attempt.status.as_str()).cyan(),
        SyncStatus::Completed if attempt.counters.failed > 0 => {
            style(attempt.status.as_str()).yellow()
        }
        SyncStatus::Completed => style(attempt.status.as_str()).green(),
        SyncStatus::Error => style(attempt.status.as_str()).red(),
        SyncStatus::Idle => style(attempt.status.as_str()).dim(),
    };
    println!("{} {}", style("Session:").dim(), settings.session);
    println!("{} {}", style("Status:").dim(), status.bold());
    if attempt.status == SyncStatus::Idle && attempt.logs.is_empty() {
        return;
    }
    if let Some(id) = &attempt.attempt_id {
        println!("{} {}", style("Batch:").dim(), id);
    }

    let c = &attempt.counters;
    println!(
        "{} {} total, {} sent, {} confirmed, {} failed, {} skipped",
        style("Records:").dim(),
        format_u64_commas(c.total),
        format_u64_commas(c.sent),
        format_u64_commas(c.confirmed),
        format_u64_commas(c.failed),
        format_u64_commas(c.skipped)
    );
    if attempt.is_syncing() {
        if let Some(started) = &attempt.timing.start_time {
            println!("{} {}", style("Started:").dim(), started);
        }
        println!(
            "{} {}",
            style("Remaining:").dim(),
            format_eta(attempt.timing.estimated_time_remaining)
        );
    }

    if !attempt.failed_records.is_empty() {
        println!();
        let mut table = styled_table();
        table.set_header(vec![header("Record"), header("Name"), header("Reason")]);
        apply_column_padding(&mut table, (0, 4));
        for record in &attempt.failed_records {
            table.add_row(vec![
                record.record_id.clone(),
                truncate(&record.display_name, 24),
                truncate(&record.reason, 60),
            ]);
        }
        println!("{table}");
    }

    if !attempt.logs.is_empty() {
        println!();
        let skip = attempt.logs.len().saturating_sub(STATUS_LOG_TAIL);
        for entry in &attempt.logs[skip..] {
            println!("{}", format_log(entry));
        }
    }
}

/// Parses `key=value`. Values that read as JSON (numbers, booleans, objects)
/// are forwarded typed; anything else is sent as a string.
fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("option key is empty in '{raw}'"));
    }
    if let Some((_, flag)) = TYPED_OPTION_KEYS.iter().find(|(name, _)| *name == key) {
        return Err(format!("'{key}' has its own flag; use {flag} instead"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
