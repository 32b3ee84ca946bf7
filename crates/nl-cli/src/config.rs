//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Base URL of the sync server.
    #[serde(default)]
    pub server_url: Option<String>,
    /// Bearer token issued at pairing. Overrides the one saved in `device.json`.
    #[serde(default)]
    pub token: Option<String>,
    /// Seconds between background sync cycles.
    pub sync_interval_secs: u64,
    /// Seconds between active-timer refreshes.
    pub timer_tick_secs: u64,
    pub request_timeout_secs: u64,
    /// Offset used for day boundaries and sleep classification. Defaults to
    /// the system's current offset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("server_url", &self.server_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("timer_tick_secs", &self.timer_tick_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("nl.db"),
            server_url: None,
            token: None,
            sync_interval_secs: nl_sync::scheduler::DEFAULT_SYNC_INTERVAL.as_secs(),
            timer_tick_secs: nl_sync::refresher::DEFAULT_TICK_INTERVAL.as_secs(),
            request_timeout_secs: nl_sync::transport::DEFAULT_TIMEOUT.as_secs(),
            utc_offset_minutes: None,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // NL_DATABASE_PATH, NL_SERVER_URL, NL_TOKEN, ...
        figment = figment.merge(Env::prefixed("NL_"));

        figment.extract()
    }

    /// The local offset for day ranges.
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .unwrap_or_else(|| Local::now().offset().fix())
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn timer_tick(&self) -> Duration {
        Duration::from_secs(self.timer_tick_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Returns the platform-specific config directory for nl.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("nl"))
}

/// Returns the platform-specific data directory for nl.
///
/// On Linux: `~/.local/share/nl`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("nl"))
}
