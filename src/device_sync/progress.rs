use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::model::{
    Counters, LogEntry, LogKind, ProgressSnapshot, SnapshotStatus, SyncAttempt, SyncStatus, Timing,
};

/// What applying a snapshot did to the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Progress,
    /// The attempt moved from `Syncing` to `Completed` on this snapshot.
    JustCompleted,
    /// Nothing changed: the attempt was not in a state that accepts snapshots.
    Redundant,
}

impl SyncAttempt {
    /// A fresh attempt in the optimistic `Syncing` state, seeded with one
    /// local log line.
    pub fn starting(seed: LogEntry) -> Self {
        Self {
            token: new_token(),
            status: SyncStatus::Syncing,
            logs: vec![seed],
            local_log_len: 1,
            ..Self::default()
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.status == SyncStatus::Syncing
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    pub fn apply_snapshot(&mut self, snapshot: ProgressSnapshot) -> Applied {
        // A completed or abandoned attempt never takes another snapshot, so a
        // duplicated "completed" response cannot fire completion twice.
        if self.status != SyncStatus::Syncing {
            return Applied::Redundant;
        }

        self.counters = snapshot.merged_counters(&self.counters);
        if let Some(batch_id) = snapshot.batch_id.filter(|id| !id.is_empty()) {
            self.attempt_id = Some(batch_id);
        }
        self.replace_server_logs(snapshot.logs);

        match snapshot.status {
            SnapshotStatus::Syncing => {
                self.timing = Timing {
                    start_time: snapshot.start_time.or(self.timing.start_time.take()),
                    estimated_time_remaining: snapshot.estimated_time_remaining,
                    average_time_per_record: snapshot.average_time_per_record,
                };
                Applied::Progress
            }
            SnapshotStatus::Completed => {
                self.failed_records = snapshot.failed_records;
                self.timing = Timing::default();
                self.status = SyncStatus::Completed;
                Applied::JustCompleted
            }
        }
    }

    /// Forces the attempt into `Error` after the service stopped answering.
    pub fn mark_unreachable(&mut self) {
        self.status = SyncStatus::Error;
        self.timing = Timing::default();
        self.push_log(LogEntry::now(
            LogKind::Error,
            "Sync service connection interrupted; stopped watching this sync",
        ));
    }

    pub fn mark_cancelled(&mut self) {
        self.status = SyncStatus::Idle;
        self.timing = Timing::default();
        self.push_log(LogEntry::now(
            LogKind::Warning,
            "Sync cancelled by user; the device job may still be running on the server",
        ));
    }

    /// Stops watching because another invocation cancelled or replaced
    /// this attempt.
    pub fn mark_released(&mut self, reason: &str) {
        self.status = SyncStatus::Idle;
        self.timing = Timing::default();
        self.push_log(LogEntry::now(LogKind::Warning, reason));
    }

    pub fn summary_line(&self) -> String {
        summary_line(&self.counters)
    }

    fn replace_server_logs(&mut self, server_logs: Vec<LogEntry>) {
        let local = self.local_log_len.min(self.logs.len());
        self.logs.truncate(local);
        self.logs.extend(server_logs);
    }
}

/// Unique per process and per start: wall clock, pid and a local counter.
fn new_token() -> String {
    static STARTS: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = STARTS.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{:x}-{seq}", std::process::id())
}

pub fn summary_line(counters: &Counters) -> String {
    format!(
        "Sync finished: {} confirmed, {} failed, {} skipped (of {})",
        counters.confirmed, counters.failed, counters.skipped, counters.total
    )
}
