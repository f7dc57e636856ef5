//! Application configuration with layered loading.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if STOWAWAY_CONFIG_FILE set)
//! 3. Environment variables (STOWAWAY_*)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::ArchiveFormat;

mod validation;

pub use validation::ConfigError;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_FILE_ENV: &str = "STOWAWAY_CONFIG_FILE";

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding offline entries and the manifest.
    ///
    /// Set via STOWAWAY_STORE_DIR environment variable.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Byte budget of the offline store.
    ///
    /// Set via STOWAWAY_MAX_CACHE_SIZE environment variable.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: u64,

    /// On-disk layout for new entries.
    ///
    /// Set via STOWAWAY_ARCHIVE_FORMAT (`single_blob` or `split`).
    #[serde(default)]
    pub archive_format: ArchiveFormat,

    /// Interval between page completion checks, in milliseconds.
    ///
    /// Set via STOWAWAY_POLL_INTERVAL_MS environment variable.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Treat the host as offline, preferring the offline store on reads.
    ///
    /// Set via STOWAWAY_FORCE_OFFLINE environment variable.
    #[serde(default)]
    pub force_offline: bool,

    /// Whether rendered mode (headless browser) is enabled.
    ///
    /// Set via STOWAWAY_RENDER_ENABLED environment variable.
    #[serde(default)]
    pub render_enabled: bool,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via STOWAWAY_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via STOWAWAY_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via STOWAWAY_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./stowaway-cache")
}

fn default_max_cache_size() -> u64 {
    100 * 1024 * 1024
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    "stowaway/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            max_cache_size: default_max_cache_size(),
            archive_format: ArchiveFormat::default(),
            poll_interval_ms: default_poll_interval_ms(),
            force_offline: false,
            render_enabled: false,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STOWAWAY_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
