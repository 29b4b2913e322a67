//! Configuration file discovery and generation.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! # auth_token = "secret"
//!
//! [catalog]
//! base_url = "https://explorecourses.stanford.edu/"
//! academic_year = "2025-2026"
//! request_timeout_secs = 30
//!
//! [rate_limit]
//! requests_per_second = 5.0
//! burst = 5
//! max_wait_ms = 10000
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 250
//! max_delay_ms = 5000
//!
//! [cache]
//! ttl_secs = 600
//! max_entries = 1024
//!
//! [session]
//! idle_timeout_secs = 1800
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::{Path, PathBuf};

use super::Config;

const APP_DIR: &str = "stanford-mcp";
const FILE_NAME: &str = "config.toml";
const LOCAL_FILE_NAME: &str = "stanford-mcp.toml";

/// Per-user config location, e.g. `~/.config/stanford-mcp/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
}

/// First existing config file: `./stanford-mcp.toml`, then the per-user location
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|path| path.is_file())
}

impl Config {
    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigFileError> {
        toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))
    }

    /// Write as TOML, creating parent directories; refuses to overwrite unless `force`
    pub fn save(&self, path: &Path, force: bool) -> Result<(), ConfigFileError> {
        if path.exists() && !force {
            return Err(ConfigFileError::Exists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigFileError::Io(e.to_string()))
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("{} already exists (use --force to overwrite)", .0.display())]
    Exists(PathBuf),
}
