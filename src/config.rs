//! # Configuration
//!
//! A JSON settings file. Every key is optional; a missing or unreadable
//! file means defaults. IGDB credentials may also come from the
//! environment, which wins over the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::logging::Logger;

pub const CLIENT_ID_ENV: &str = "IGDB_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "IGDB_CLIENT_SECRET";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The streaming host executable.
    pub sunshine_path: String,
    /// The virtual display driver's control tool.
    pub driver_tool_path: String,
    /// Where `install` downloads the driver package from.
    pub virtual_display_driver_url: Option<String>,
    /// Expected SHA-256 of the driver package, hex encoded.
    pub virtual_display_driver_sha256: Option<String>,
    /// Where `install` unpacks the driver package. Relative paths are
    /// resolved against the working directory.
    pub deps_path: String,
    /// Overrides the Steam location from the registry.
    pub steam_path: Option<String>,
    pub igdb_client_id: Option<String>,
    pub igdb_client_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sunshine_path: r"C:\Program Files\Sunshine\Sunshine.exe".to_owned(),
            driver_tool_path: r"C:\Path\To\VirtualDriverControl.exe".to_owned(),
            virtual_display_driver_url: None,
            virtual_display_driver_sha256: None,
            deps_path: "deps".to_owned(),
            steam_path: None,
            igdb_client_id: None,
            igdb_client_secret: None,
        }
    }
}

/// `<config dir>/streamctl/settings.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("streamctl").join("settings.json"))
}

impl Config {
    /// Load the settings at `path`, falling back to defaults on any problem.
    pub fn load(path: &Path, log: &Logger) -> Config {
        log.scope(|| {
            if !path.exists() {
                warn!(?path, "Config file not found, using defaults");
                return Config::default();
            }
            match Config::read(path) {
                Ok(config) => {
                    info!(?path, "Loaded config");
                    config
                }
                Err(err) => {
                    error!(?path, %err, "Error loading config, using defaults");
                    Config::default()
                }
            }
        })
    }

    fn read(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Apply credential overrides, e.g. `config.with_env(|k| std::env::var(k).ok())`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Config {
        let non_empty = |key: &str| lookup(key).filter(|v: &String| !v.trim().is_empty());
        if let Some(id) = non_empty(CLIENT_ID_ENV) {
            self.igdb_client_id = Some(id);
        }
        if let Some(secret) = non_empty(CLIENT_SECRET_ENV) {
            self.igdb_client_secret = Some(secret);
        }
        self
    }

    /// Both IGDB credentials, when both are set.
    pub fn igdb_credentials(&self) -> Option<(&str, &str)> {
        match (&self.igdb_client_id, &self.igdb_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }
}
