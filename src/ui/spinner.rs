use std::future::Future;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Awaits a single service call behind a spinner on stderr. The call's
/// latency is logged at debug level so slow terminals show up with
/// `DEVSYNC_LOG=debug`.
pub async fn with_spinner<T, F: Future<Output = T>>(message: &str, fut: F) -> T {
    let spinner = spinner_bar(message, std::io::stderr().is_terminal());
    let start = Instant::now();
    let result = fut.await;
    spinner.finish_and_clear();
    tracing::debug!(
        call = message.trim_end_matches('.'),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "service call finished"
    );
    result
}

fn spinner_bar(message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
