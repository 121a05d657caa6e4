//! # Application Configuration
//!
//! `sitegraph.toml` layout:
//!
//! ```toml
//! [site]
//! absolute_url = "https://example.org"
//! sef = true
//! front_page = 1
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! rate_limit = 100
//!
//! [storage]
//! database = "sitegraph.db"
//! include_root = "includes"
//!
//! [[controllers]]
//! path = "content/controllers/page"
//! body = "<h1>{{name}}</h1>"
//! ```
//!
//! Environment overrides: `SITEGRAPH_CONFIG` (file path),
//! `SITEGRAPH_RATE_LIMIT`, `SITEGRAPH_CORS_ORIGINS`. The admin key is read
//! from `SITEGRAPH_API_KEY` at request time.

use serde::{Deserialize, Serialize};
use sitegraph_core::{SiteConfig, SiteError};
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sitegraph.toml";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Whole application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub controllers: Vec<ControllerSpec>,
}

/// HTTP listener and protection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second; 0 disables limiting.
    pub rate_limit: u32,
    /// Comma-separated origins or `*`. Unset means localhost only.
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: 100,
            cors_origins: None,
        }
    }
}

/// On-disk locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// redb file holding rows, permissions, cron runs and snapshots.
    pub database: PathBuf,
    /// Directory external-file nodes are read from.
    pub include_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("sitegraph.db"),
            include_root: PathBuf::from("includes"),
        }
    }
}

/// A controller registered from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSpec {
    /// Conventional path, e.g. `content/controllers/page`.
    pub path: String,
    /// Output template; without one the controller describes the request.
    #[serde(default)]
    pub body: Option<String>,
}

impl AppConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SiteError> {
        toml::from_str(text).map_err(|e| SiteError::ConfigError(e.to_string()))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `SITEGRAPH_CONFIG` and then
    /// `sitegraph.toml` are tried; if neither exists defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SiteError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var("SITEGRAPH_CONFIG")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                    default.exists().then_some(default)
                }),
        };

        let Some(path) = path else {
            tracing::debug!("no configuration file, using defaults");
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            SiteError::ConfigError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(SiteError::ConfigError(format!(
                "Config file {} bytes exceeds maximum {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| SiteError::ConfigError(format!("Read '{}': {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Effective rate limit: `SITEGRAPH_RATE_LIMIT` wins over the file.
    #[must_use]
    pub fn rate_limit(&self) -> u32 {
        std::env::var("SITEGRAPH_RATE_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.server.rate_limit)
    }

    /// Effective CORS origins: `SITEGRAPH_CORS_ORIGINS` wins over the file.
    #[must_use]
    pub fn cors_origins(&self) -> Option<String> {
        std::env::var("SITEGRAPH_CORS_ORIGINS")
            .ok()
            .or_else(|| self.server.cors_origins.clone())
    }
}
