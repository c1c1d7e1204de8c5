use std::fmt::Write as _;

use anyhow::{bail, Result};
use dialoguer::console;

use crate::context::CliController;
use crate::device_sync::{LogKind, ServiceError, SyncError};
use crate::ui::{print_with_pager, with_spinner};

pub(super) async fn run(ctl: &CliController, batch_id: &str, json: bool) -> Result<()> {
    let detail = match with_spinner("Loading batch...", ctl.batch_detail(batch_id)).await {
        Ok(detail) => detail,
        Err(SyncError::Service(ServiceError::Status { status: 404, .. })) => {
            bail!("batch '{batch_id}' not found")
        }
        Err(err) => return Err(err.into()),
    };

    if json {
        println!("{}", serde_json::to_string(&detail)?);
        return Ok(());
    }

    let summary = &detail.summary;
    let mut output = String::new();
    writeln!(output, "Viewing batch {}", console::style(&summary.batch_id).bold())?;
    for (label, value) in [
        ("Strategy:", summary.strategy.as_deref()),
        ("Status:", summary.status.as_deref()),
        ("Started:", summary.started_at.as_deref()),
        ("Finished:", summary.finished_at.as_deref()),
    ] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            writeln!(output, "{} {}", console::style(label).dim(), value)?;
        }
    }
    writeln!(
        output,
        "{} {} confirmed, {} failed, {} skipped (of {})",
        console::style("Records:").dim(),
        summary.confirmed,
        summary.failed,
        summary.skipped,
        summary.total
    )?;

    if !detail.logs.is_empty() {
        writeln!(output)?;
        for entry in &detail.logs {
            let message = match entry.kind {
                LogKind::Error => console::style(&entry.message).red(),
                LogKind::Warning => console::style(&entry.message).yellow(),
                LogKind::Success => console::style(&entry.message).green(),
                LogKind::Info => console::style(&entry.message),
            };
            writeln!(output, "{} {}", console::style(&entry.time).dim(), message)?;
        }
    }

    print_with_pager(output.trim_end())?;
    Ok(())
}
