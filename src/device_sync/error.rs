use thiserror::Error;

use super::model::SyncStatus;

/// Failures talking to the Sync Service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("sync service rejected the request: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Transport errors and 5xx responses are worth repeating for idempotent reads.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport { .. } => true,
            ServiceError::Status { status, .. } => *status >= 500 || *status == 429,
            ServiceError::Decode { .. } | ServiceError::Rejected(_) => false,
        }
    }
}

/// Commands the controller refused or could not carry out.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a device sync is already running")]
    AttemptActive,
    #[error("cannot {action} while the sync is {status}")]
    InvalidTransition {
        action: &'static str,
        status: SyncStatus,
    },
    #[error("there are no failed records to retry")]
    NoFailedRecords,
    #[error(transparent)]
    Service(#[from] ServiceError),
}
