use super::model::{FailedRecord, LogEntry, LogKind, PayloadEncoding, RetryRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Resend the failed subset with the encoding the batch used.
    Original,
    /// Resend the failed subset with the fallback payload encoding, for
    /// failures caused by the payload format rather than the record itself.
    FallbackEncoding,
}

impl RetryMode {
    pub fn label(self) -> &'static str {
        match self {
            RetryMode::Original => "original encoding",
            RetryMode::FallbackEncoding => "fallback encoding",
        }
    }

    fn encoding(self) -> Option<PayloadEncoding> {
        match self {
            RetryMode::Original => None,
            RetryMode::FallbackEncoding => Some(PayloadEncoding::Fallback),
        }
    }
}

pub fn retry_request(records: &[FailedRecord], mode: RetryMode) -> RetryRequest {
    RetryRequest {
        failed_records: records.to_vec(),
        encoding: mode.encoding(),
    }
}

pub fn retry_seed_log(records: &[FailedRecord], mode: RetryMode) -> LogEntry {
    let noun = if records.len() == 1 { "record" } else { "records" };
    LogEntry::now(
        LogKind::Info,
        format!(
            "Retrying {} failed {noun} ({})",
            records.len(),
            mode.label()
        ),
    )
}
