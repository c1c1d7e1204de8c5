mod format;
mod plurals;

pub use format::{format_eta, format_u64_commas};
pub use plurals::{BATCH, RECORD};
