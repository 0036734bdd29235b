//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use at_core::{CategoryRule, Settings};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Seconds between samples.
    pub sampling_interval_seconds: u64,
    /// Seconds without input after which the user counts as away.
    pub idle_threshold_seconds: u64,
    /// Consecutive probe failures before a warning is shown.
    pub failure_escalation_threshold: u32,
    /// Time budget for each probe call.
    pub probe_timeout_ms: u64,
    /// Apps that are never tracked.
    pub ignored_apps: Vec<String>,
    /// Category rules, in matching order.
    pub categories: Vec<CategoryRule>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("sampling_interval_seconds", &self.sampling_interval_seconds)
            .field("idle_threshold_seconds", &self.idle_threshold_seconds)
            .field("failure_escalation_threshold", &self.failure_escalation_threshold)
            .field("probe_timeout_ms", &self.probe_timeout_ms)
            .field("ignored_apps", &self.ignored_apps)
            .field("categories", &self.categories.len())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let settings = Settings::default();
        Self {
            database_path: data_dir.join("atrack.db"),
            sampling_interval_seconds: settings.sampling_interval_seconds,
            idle_threshold_seconds: settings.idle_threshold_seconds,
            failure_escalation_threshold: settings.failure_escalation_threshold,
            probe_timeout_ms: settings.probe_timeout_ms,
            ignored_apps: settings.ignored_apps,
            categories: settings.categories,
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
        if let Some(path) = default_config_file() {
            figment = figment.merge(Toml::file(path));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (ATRACK_*)
        figment = figment.merge(Env::prefixed("ATRACK_"));

        figment.extract()
    }

    /// The tracker settings carried by this configuration.
    pub fn tracker_settings(&self) -> Settings {
        Settings {
            ignored_apps: self.ignored_apps.clone(),
            categories: self.categories.clone(),
            sampling_interval_seconds: self.sampling_interval_seconds,
            idle_threshold_seconds: self.idle_threshold_seconds,
            failure_escalation_threshold: self.failure_escalation_threshold,
            probe_timeout_ms: self.probe_timeout_ms,
        }
    }

    /// Directory holding the database, lock file and saved reports.
    pub fn data_dir(&self) -> &Path {
        self.database_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Returns the platform-specific config directory for atrack.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("atrack"))
}

/// Returns the default config file path.
///
/// On Linux: `~/.config/atrack/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs_config_path().map(|p| p.join("config.toml"))
}

/// Returns the platform-specific data directory for atrack.
///
/// On Linux: `~/.local/share/atrack`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("atrack"))
}
