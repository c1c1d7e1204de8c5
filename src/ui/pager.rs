use std::io::{self, IsTerminal, Write};
use std::process::{Command, Stdio};

const DEFAULT_PAGER: &str = "less -R";

/// Prints `output`, piping it through a pager when it would overflow the
/// terminal. `DEVSYNC_PAGER` takes precedence over `PAGER`; setting it to
/// an empty string or `cat` turns paging off, which suits kiosk consoles.
pub fn print_with_pager(output: &str) -> io::Result<()> {
    if !io::stdout().is_terminal() {
        println!("{output}");
        return Ok(());
    }

    let (_, term_height) = crossterm::terminal::size().unwrap_or((80, 24));
    let configured = std::env::var("DEVSYNC_PAGER")
        .ok()
        .or_else(|| std::env::var("PAGER").ok().filter(|s| !s.is_empty()));
    let pager = match pager_command(configured.as_deref()) {
        Some(pager) if output.lines().count() > term_height as usize => pager,
        _ => {
            println!("{output}");
            return Ok(());
        }
    };

    let (program, args) = pager;
    let mut child = match Command::new(&program).args(&args).stdin(Stdio::piped()).spawn() {
        Ok(c) => c,
        Err(err) => {
            tracing::debug!(pager = %program, error = %err, "pager unavailable");
            println!("{output}");
            return Ok(());
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        // The pager may exit before reading everything.
        let _ = writeln!(stdin, "{output}");
    }

    child.wait()?;
    Ok(())
}

/// Splits the configured pager into program and arguments. `None` means
/// print directly.
fn pager_command(configured: Option<&str>) -> Option<(String, Vec<String>)> {
    let line = configured.unwrap_or(DEFAULT_PAGER);
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    if program == "cat" {
        return None;
    }
    Some((program, parts.collect()))
}
