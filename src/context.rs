use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::args::{BaseArgs, DEFAULT_API_URL, DEFAULT_SESSION};
use crate::config::{self, Config};
use crate::device_sync::{
    Controller, FileSnapshotStore, HttpSyncService, PersistenceManager, SyncPolicy,
};
use crate::http::ApiClient;
use crate::ui::ConsoleNotifier;

pub type CliController = Controller<HttpSyncService, ConsoleNotifier>;

/// Connection and session settings after layering flags, environment and the
/// config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub session: String,
    pub state_dir: PathBuf,
}

pub fn resolve(base: &BaseArgs) -> Result<Settings> {
    resolve_with(base, config::load_global())
}

fn resolve_with(base: &BaseArgs, config: Config) -> Result<Settings> {
    let api_url = base
        .api_url
        .clone()
        .or(config.api_url)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let session = base
        .session
        .clone()
        .or(config.session)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    let state_dir = match base.state_dir.clone().or(config.state_dir) {
        Some(dir) => dir,
        None => default_state_dir()?,
    };

    Ok(Settings {
        api_url,
        api_key: base.api_key.clone(),
        session,
        state_dir,
    })
}

fn default_state_dir() -> Result<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("devsync"))
        .ok_or_else(|| anyhow!("Could not determine a state directory; pass --state-dir"))
}

/// Builds the controller for this session. Persisted state is not read
/// until the caller asks for a resume.
pub fn controller(settings: &Settings) -> Result<CliController> {
    let client = ApiClient::new(&settings.api_url, settings.api_key.as_deref())?;
    let store = FileSnapshotStore::for_session(&settings.state_dir, &settings.session);
    tracing::debug!(
        api_url = %settings.api_url,
        session = %settings.session,
        state_file = %store.path().display(),
        "using sync session"
    );
    Ok(Controller::new(
        HttpSyncService::new(client),
        ConsoleNotifier,
        PersistenceManager::new(Box::new(store)),
        SyncPolicy::default(),
    ))
}
