mod pager;
mod spinner;
mod status;
mod table;

pub use pager::print_with_pager;
pub use spinner::with_spinner;
pub use status::{print_command_status, CommandStatus, ConsoleNotifier};
pub use table::{apply_column_padding, header, styled_table, truncate};

pub fn is_interactive() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}
