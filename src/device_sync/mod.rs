//! Client-side orchestration of the device sync job.
//!
//! The server runs the actual push to the check-in terminals. This module
//! starts that job, polls its progress, keeps the current attempt in a
//! session-scoped file so a later invocation can pick it up again, and
//! offers a narrower retry for the records that failed.

use std::time::Duration;

mod controller;
mod error;
mod failure;
mod model;
mod notify;
mod persist;
mod poller;
mod progress;
mod retry;
mod service;
#[cfg(test)]
mod testing;

pub use controller::{Controller, PollEvent, ResumeOutcome};
pub use error::{ServiceError, SyncError};
pub use model::{
    LogEntry, LogKind, PayloadEncoding, Strategy, SyncAttempt, SyncOptions, SyncStatus,
    TYPED_OPTION_KEYS,
};
pub use notify::{Notifier, Tone};
pub use persist::{FileSnapshotStore, PersistenceManager};
pub use poller::{PollExit, Poller};
pub use retry::RetryMode;
pub use service::HttpSyncService;

/// Timing and tolerance knobs for the orchestrator. Not exposed to users.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub poll_interval: Duration,
    pub failure_threshold: u32,
    pub staleness_window: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            failure_threshold: 3,
            staleness_window: Duration::from_secs(10 * 60),
        }
    }
}
