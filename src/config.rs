use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub session: Option<String>,
    pub state_dir: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub fn global_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join("devsync").join("config.json"))
}

/// Reads a config file. A missing or unreadable file yields the defaults.
pub fn load_file(path: &Path) -> Config {
    let file_contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Config::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read config file");
            return Config::default();
        }
    };

    let config: Config = match serde_json::from_str(&file_contents) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
            return Config::default();
        }
    };

    for key in config.extra.keys() {
        tracing::warn!(path = %path.display(), key, "unknown config key");
    }

    tracing::debug!(path = %path.display(), "loaded config");
    config
}

pub fn load_global() -> Config {
    match global_path() {
        Ok(path) => load_file(&path),
        Err(e) => {
            tracing::debug!(error = %e, "no config directory; using defaults");
            Config::default()
        }
    }
}
