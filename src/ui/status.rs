use dialoguer::console::style;

use crate::device_sync::{Notifier, Tone};

pub enum CommandStatus {
    Success,
    Error,
    Warning,
    Info,
}

pub fn print_command_status(status: CommandStatus, message: &str) {
    let indicator = match status {
        CommandStatus::Success => style("✓").green(),
        CommandStatus::Error => style("✗").red(),
        CommandStatus::Warning => style("!").yellow(),
        CommandStatus::Info => style("•").dim(),
    };
    eprintln!("{indicator} {message}");
}

/// Prints orchestrator notifications as status lines on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, tone: Tone, message: &str) {
        let status = match tone {
            Tone::Success => CommandStatus::Success,
            Tone::Warning => CommandStatus::Warning,
            Tone::Error => CommandStatus::Error,
            Tone::Info => CommandStatus::Info,
        };
        print_command_status(status, message);
    }
}
