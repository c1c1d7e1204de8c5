/// How a user-facing notification should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

/// Receives one-off, user-visible notifications (the "toast" channel).
pub trait Notifier {
    fn notify(&self, tone: Tone, message: &str);
}
