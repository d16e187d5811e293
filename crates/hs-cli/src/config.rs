//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hs_core::SchedulePolicy;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Recorded as the author of sessions booked from this machine.
    pub created_by: String,
    /// Hours after a session's start when it can no longer be changed.
    pub edit_lock_hours: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("hs.db"),
            created_by: "admin".to_string(),
            edit_lock_hours: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (HS_*)
        figment = figment.merge(Env::prefixed("HS_"));

        figment.extract()
    }

    /// Scheduling rules derived from this configuration.
    pub const fn policy(&self) -> SchedulePolicy {
        SchedulePolicy {
            edit_lock_hours: self.edit_lock_hours,
        }
    }
}

/// Returns the platform-specific config directory for hs.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hs"))
}

/// Returns the platform-specific data directory for hs.
///
/// On Linux: `~/.local/share/hs`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("hs"))
}
