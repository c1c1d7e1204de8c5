use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which records the server should include in a batch. The selection itself
/// happens server-side; the tag is forwarded as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    All,
    Unsynced,
    Changed,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::All => "all",
            Strategy::Unsynced => "unsynced",
            Strategy::Changed => "changed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    Standard,
    Fallback,
}

/// Wire names of the typed `SyncOptions` fields. `extra` must not reuse
/// them or the flattened object would carry the key twice.
pub const TYPED_OPTION_KEYS: [(&str, &str); 2] = [
    ("photoEncoding", "--photo-encoding"),
    ("validateFirst", "--validate-first"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_encoding: Option<PayloadEncoding>,
    #[serde(default)]
    pub validate_first: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchRequest {
    pub strategy: Strategy,
    pub options: SyncOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub failed_records: Vec<FailedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<PayloadEncoding>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub total: u64,
    pub sent: u64,
    pub confirmed: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl Counters {
    /// Checks the bounds every applied snapshot must respect. Until the
    /// server has reported a total, there is nothing to check against.
    pub fn is_consistent(&self) -> bool {
        if self.total == 0 {
            return true;
        }
        self.sent <= self.total && self.confirmed + self.failed + self.skipped <= self.total
    }

    pub fn settled(&self) -> u64 {
        self.confirmed + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_time_per_record: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub time: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    /// Builds an entry stamped with the local wall-clock time.
    pub fn now(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    pub record_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAttempt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    /// Client-side identity of this attempt. Every invocation sharing the
    /// session file compares it before writing.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub status: SyncStatus,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub failed_records: Vec<FailedRecord>,
    /// Number of leading `logs` entries written by this client rather than
    /// reported by the server.
    #[serde(default)]
    pub local_log_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Syncing,
    Completed,
}

/// One progress report from the Sync Service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub status: SnapshotStatus,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub sent: Option<u64>,
    #[serde(default)]
    pub confirmed: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub skipped: Option<u64>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub failed_records: Vec<FailedRecord>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub start_time: Option<String>,
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
    #[serde(default)]
    pub average_time_per_record: Option<f64>,
    #[serde(default)]
    pub batch_id: Option<String>,
}

impl ProgressSnapshot {
    /// Counters after merging this snapshot over `previous`. Fields the
    /// server left out keep their previous value.
    pub fn merged_counters(&self, previous: &Counters) -> Counters {
        Counters {
            total: self.total.unwrap_or(previous.total),
            sent: self.sent.unwrap_or(previous.sent),
            confirmed: self.confirmed.unwrap_or(previous.confirmed),
            failed: self.failed.unwrap_or(previous.failed),
            skipped: self.skipped.unwrap_or(previous.skipped),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartAck {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSummary {
    pub batch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub total: u64,
    pub confirmed: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDetail {
    pub summary: BatchSummary,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_accepts_numeric_start_time_and_missing_counters() {
        let snapshot: ProgressSnapshot = serde_json::from_value(serde_json::json!({
            "status": "syncing",
            "total": 10,
            "sent": 3,
            "startTime": 1_700_000_000_000_u64,
            "logs": [{ "time": "10:00:01", "type": "success", "message": "LHZ0001 confirmed" }],
        }))
        .unwrap();

        assert_eq!(snapshot.status, SnapshotStatus::Syncing);
        assert_eq!(snapshot.start_time.as_deref(), Some("1700000000000"));
        assert_eq!(snapshot.confirmed, None);
        assert_eq!(snapshot.logs[0].kind, LogKind::Success);

        let previous = Counters {
            confirmed: 1,
            ..Counters::default()
        };
        let merged = snapshot.merged_counters(&previous);
        assert_eq!(merged.total, 10);
        assert_eq!(merged.sent, 3);
        assert_eq!(merged.confirmed, 1);
    }

    #[test]
    fn unknown_snapshot_status_is_rejected() {
        let parsed = serde_json::from_value::<ProgressSnapshot>(serde_json::json!({
            "status": "paused",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn counters_check_bounds_only_once_total_is_known() {
        let unknown_total = Counters {
            confirmed: 4,
            ..Counters::default()
        };
        assert!(unknown_total.is_consistent());

        let overflowing = Counters {
            total: 10,
            sent: 10,
            confirmed: 8,
            failed: 2,
            skipped: 1,
        };
        assert!(!overflowing.is_consistent());

        let over_sent = Counters {
            total: 5,
            sent: 6,
            ..Counters::default()
        };
        assert!(!over_sent.is_consistent());
    }

    #[test]
    fn retry_request_omits_encoding_for_original_mode() {
        let request = RetryRequest {
            failed_records: vec![FailedRecord {
                record_id: "LHZ0007".to_string(),
                display_name: "某义工".to_string(),
                reason: "timeout".to_string(),
            }],
            encoding: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("encoding").is_none());
        assert_eq!(body["failedRecords"][0]["recordId"], "LHZ0007");
    }
}
