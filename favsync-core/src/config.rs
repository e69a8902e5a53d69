use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FavoritesError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_STORAGE_KEY: &str = "favorites";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MUTATION_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    /// Directory holding the snapshot file; `None` means the platform data dir.
    pub storage_dir: Option<PathBuf>,
    pub storage_key: String,
    pub request_timeout_seconds: u64,
    pub mutation_timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            storage_dir: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            mutation_timeout_seconds: DEFAULT_MUTATION_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// `~/.config/favsync` on Linux.
    pub fn config_dir() -> Result<PathBuf, FavoritesError> {
        let base = dirs::config_dir()
            .ok_or_else(|| FavoritesError::Config("no configuration directory on this platform".into()))?;
        Ok(base.join("favsync"))
    }

    pub fn config_file_path() -> Result<PathBuf, FavoritesError> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads the user's config file, falling back to defaults, then applies env overrides.
    pub fn load() -> Self {
        let mut config = match Self::config_file_path() {
            Ok(path) if path.exists() => Self::from_file(&path),
            Ok(_) => Self::default(),
            Err(e) => {
                warn!(error = %e, "cannot locate config file, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Reads a JSON config file. Unreadable or malformed files yield the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<SyncConfig>(&bytes) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to read config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), FavoritesError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Overrides fields from `FAVSYNC_*` variables. Unparseable numbers are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FAVSYNC_API_URL") {
            self.api_base_url = url;
        }
        if let Some(token) = lookup("FAVSYNC_TOKEN") {
            self.auth_token = if token.trim().is_empty() { None } else { Some(token) };
        }
        if let Some(dir) = lookup("FAVSYNC_STORAGE_DIR") {
            self.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = parse_secs(lookup("FAVSYNC_REQUEST_TIMEOUT_SECS"), "FAVSYNC_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_seconds = secs;
        }
        if let Some(secs) = parse_secs(lookup("FAVSYNC_MUTATION_TIMEOUT_SECS"), "FAVSYNC_MUTATION_TIMEOUT_SECS") {
            self.mutation_timeout_seconds = secs;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.mutation_timeout_seconds)
    }

    /// Where the snapshot lives when no explicit directory is configured.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        match &self.storage_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .or_else(dirs::config_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("favsync"),
        }
    }
}

fn parse_secs(raw: Option<String>, var: &str) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!(var, value = %raw, "ignoring invalid timeout override");
            None
        }
    }
}
