use std::fmt::Write as _;

use anyhow::Result;
use dialoguer::console;

use crate::context::CliController;
use crate::ui::{apply_column_padding, header, print_with_pager, styled_table, with_spinner};
use crate::utils::BATCH;

use super::ListArgs;

pub(super) async fn run(ctl: &CliController, args: &ListArgs, json: bool) -> Result<()> {
    let batches = with_spinner(
        "Loading sync history...",
        ctl.list_batches(args.page, args.page_size),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string(&batches)?);
        return Ok(());
    }

    let mut output = String::new();
    writeln!(
        output,
        "{} {} on page {}\n",
        console::style(batches.len()),
        BATCH.for_count(batches.len()),
        console::style(args.page).bold()
    )?;

    let mut table = styled_table();
    table.set_header(vec![
        header("Batch"),
        header("Strategy"),
        header("Started"),
        header("Status"),
        header("Confirmed"),
        header("Failed"),
        header("Skipped"),
        header("Total"),
    ]);
    apply_column_padding(&mut table, (0, 3));

    for batch in &batches {
        table.add_row(vec![
            batch.batch_id.clone(),
            dash(batch.strategy.as_deref()),
            dash(batch.started_at.as_deref()),
            dash(batch.status.as_deref()),
            batch.confirmed.to_string(),
            batch.failed.to_string(),
            batch.skipped.to_string(),
            batch.total.to_string(),
        ]);
    }

    write!(output, "{table}")?;
    if batches.len() as u32 == args.page_size {
        write!(
            output,
            "\n\nMore may follow: devsync batches list --page {}",
            args.page + 1
        )?;
    }
    print_with_pager(&output)?;
    Ok(())
}

fn dash(value: Option<&str>) -> String {
    value
        .filter(|s| !s.is_empty())
        .unwrap_or("-")
        .to_string()
}
