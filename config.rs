/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! File configuration (`repin.toml`).
//!
//! The only user-facing toggle, `autoTrackPinned`, is not stored here: it
//! lives in the pin store next to the desired set (see
//! [`crate::persistence::Settings`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "repin.toml";
const DEFAULT_BADGE_TEXT: &str = "PIN";
const DEFAULT_WRITER_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepinConfig {
    /// Schemes of internal runtime pages; never recreated.
    pub privileged_schemes: Vec<String>,
    /// Schemes whose pages may receive a restore notice.
    pub notice_schemes: Vec<String>,
    /// Indicator shown on protected entities.
    pub badge_text: String,
    /// Depth of the serialized desired-set write queue.
    pub writer_queue_capacity: usize,
    /// Store file used by the admin CLI. Defaults to [`default_store_path`].
    pub store_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for RepinConfig {
    fn default() -> Self {
        Self {
            privileged_schemes: vec![
                "chrome".to_string(),
                "chrome-untrusted".to_string(),
                "chrome-extension".to_string(),
            ],
            notice_schemes: vec!["http".to_string(), "https".to_string(), "file".to_string()],
            badge_text: DEFAULT_BADGE_TEXT.to_string(),
            writer_queue_capacity: DEFAULT_WRITER_QUEUE_CAPACITY,
            store_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl RepinConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("config: {} not found, using defaults", path.display());
                return Ok(Self::default());
            },
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            },
        };
        Self::from_toml(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        if config.writer_queue_capacity == 0 {
            return Err("writer_queue_capacity must be at least 1".to_string());
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn store_path(&self) -> Option<PathBuf> {
        self.store_path.clone().or_else(default_store_path)
    }
}

/// `<config dir>/repin/repin.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("repin").join(CONFIG_FILE_NAME))
}

/// `<data dir>/repin/store.json`
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("repin").join("store.json"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to serialize config: {0}")]
    Serialize(String),
}
