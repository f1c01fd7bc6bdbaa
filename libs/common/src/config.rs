//! Application configuration
//!
//! Values come from built-in defaults, an optional `balanciago.toml` in the
//! working directory, and `BALANCIAGO_*` environment variables, in increasing
//! priority.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Persistence backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

/// Deploy-time configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Prefix for every storage key
    pub app_name: String,
    /// Google API key for the Sheets API
    pub api_key: String,
    /// OAuth client identifier
    pub client_id: String,
    /// OAuth client secret (installed-app clients)
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Redirect URI registered for the OAuth client
    pub redirect_url: String,
    pub storage: StorageBackend,
    /// Directory for the file backend (default: platform config dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    pub redis_url: String,
}

impl AppConfig {
    /// Load configuration from defaults, `balanciago.toml` and the environment
    ///
    /// # Environment Variables
    /// - `BALANCIAGO_APP_NAME`: storage key prefix (default: "balanciago")
    /// - `BALANCIAGO_API_KEY`: Google API key (default: empty)
    /// - `BALANCIAGO_CLIENT_ID`: OAuth client id (default: empty)
    /// - `BALANCIAGO_CLIENT_SECRET`: OAuth client secret (optional)
    /// - `BALANCIAGO_REDIRECT_URL`: redirect URI (default: "http://127.0.0.1:8085/callback")
    /// - `BALANCIAGO_STORAGE`: `memory`, `file` or `redis` (default: "file")
    /// - `BALANCIAGO_DATA_DIR`: directory for the file backend (optional)
    /// - `BALANCIAGO_REDIS_URL`: Redis URL (default: "redis://localhost:6379")
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("app_name", "balanciago")?
            .set_default("api_key", "")?
            .set_default("client_id", "")?
            .set_default("redirect_url", "http://127.0.0.1:8085/callback")?
            .set_default("storage", "file")?
            .set_default("redis_url", "redis://localhost:6379")?
            .add_source(File::with_name("balanciago").required(false))
            .add_source(Environment::with_prefix("BALANCIAGO"))
            .build()?
            .try_deserialize()
    }
}
