use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{SyncAttempt, SyncStatus};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;
// Blobs written before versioning carry no `schemaVersion` and share the v1 shape.
const LEGACY_SCHEMA_VERSION: u32 = 0;

/// A single durable slot holding the serialized attempt for one session.
pub trait SnapshotStore {
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, contents: &str) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub schema_version: u32,
    pub saved_at: u64,
    #[serde(flatten)]
    pub attempt: SyncAttempt,
}

/// Result of reading the slot at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum Restored {
    Nothing,
    /// An in-flight attempt young enough to keep watching.
    InFlight(SyncAttempt),
    /// A recently completed attempt, kept so its result is still visible.
    Finished(SyncAttempt),
    Stale,
    Discarded,
}

pub struct PersistenceManager {
    store: Box<dyn SnapshotStore>,
}

impl PersistenceManager {
    pub fn new(store: Box<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, attempt: &SyncAttempt) -> Result<()> {
        let snapshot = PersistedSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            saved_at: epoch_seconds(),
            attempt: attempt.clone(),
        };
        let json = serde_json::to_string(&snapshot).context("failed to serialize sync attempt")?;
        self.store.write(&json)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove()
    }

    pub fn load(&self, staleness_window: Duration) -> Restored {
        let raw = match self.store.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Restored::Nothing,
            Err(err) => {
                tracing::warn!(error = %err, "could not read persisted sync attempt");
                self.discard();
                return Restored::Discarded;
            }
        };

        let snapshot = match decode_snapshot(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable persisted sync attempt");
                self.discard();
                return Restored::Discarded;
            }
        };

        let age = epoch_seconds().saturating_sub(snapshot.saved_at);
        if age > staleness_window.as_secs() {
            tracing::warn!(
                age_secs = age,
                status = %snapshot.attempt.status,
                "persisted sync attempt is stale; not resuming"
            );
            self.discard();
            return Restored::Stale;
        }

        match snapshot.attempt.status {
            SyncStatus::Syncing => Restored::InFlight(snapshot.attempt),
            SyncStatus::Completed => Restored::Finished(snapshot.attempt),
            SyncStatus::Idle | SyncStatus::Error => {
                self.discard();
                Restored::Nothing
            }
        }
    }

    /// Reads the slot as it is right now, without the staleness rules and
    /// without removing anything.
    pub fn peek(&self) -> Result<Option<PersistedSnapshot>> {
        match self.store.read()? {
            Some(raw) => decode_snapshot(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn discard(&self) {
        if let Err(err) = self.store.remove() {
            tracing::warn!(error = %err, "failed to remove persisted sync attempt");
        }
    }
}

fn decode_snapshot(raw: &str) -> Result<PersistedSnapshot> {
    let mut value: Value = serde_json::from_str(raw).context("persisted attempt is not JSON")?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| anyhow!("persisted attempt is not a JSON object"))?;

    let version = match object.get("schemaVersion") {
        None => LEGACY_SCHEMA_VERSION,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| anyhow!("invalid schemaVersion {v}"))?,
    };

    match version {
        SNAPSHOT_SCHEMA_VERSION => {}
        LEGACY_SCHEMA_VERSION => {
            tracing::debug!("migrating unversioned persisted attempt");
            object.insert("schemaVersion".to_string(), SNAPSHOT_SCHEMA_VERSION.into());
        }
        other => return Err(anyhow!("unsupported schemaVersion {other}")),
    }

    serde_json::from_value(value).context("persisted attempt has an unexpected shape")
}

pub fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Stores the attempt as one JSON file per session.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_session(state_dir: &Path, session: &str) -> Self {
        Self::new(
            state_dir
                .join("sessions")
                .join(format!("{}.json", sanitize_segment(session))),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    fn write(&self, contents: &str) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("path has no parent: {}", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!(
                "failed to move temporary file {} to {}",
                tmp.display(),
                self.path.display()
            )
        })
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}

fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
