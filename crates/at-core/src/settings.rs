//! Tracker settings and their startup validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::{Categorizer, CategoryRule, IGNORED, UNCATEGORIZED};

const SECONDS_PER_DAY: u64 = 86_400;

/// Configuration errors. These abort startup before the sampling loop runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sampling interval must be positive")]
    ZeroSamplingInterval,
    #[error("idle threshold must be positive")]
    ZeroIdleThreshold,
    #[error("idle threshold ({idle}s) must be greater than the sampling interval ({interval}s)")]
    IdleThresholdTooShort { idle: u64, interval: u64 },
    #[error("idle threshold ({0}s) must be shorter than one day")]
    IdleThresholdTooLong(u64),
    #[error("failure escalation threshold must be at least 1")]
    ZeroEscalationThreshold,
    #[error("probe timeout must be positive")]
    ZeroProbeTimeout,
    #[error("category name cannot be empty")]
    EmptyCategoryName,
    #[error("category name `{0}` is reserved")]
    ReservedCategoryName(String),
    #[error("category `{0}` is defined more than once")]
    DuplicateCategory(String),
    #[error("category `{category}` has an empty keyword")]
    EmptyKeyword { category: String },
    #[error("ignored app entries cannot be empty")]
    EmptyIgnoredApp,
}

/// Settings consumed by the tracker. Read once at startup and immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Apps that never produce sessions.
    pub ignored_apps: Vec<String>,
    /// Category rules, in matching order.
    pub categories: Vec<CategoryRule>,
    pub sampling_interval_seconds: u64,
    /// Seconds without input after which the user is away.
    pub idle_threshold_seconds: u64,
    /// Consecutive probe failures that raise a warning.
    pub failure_escalation_threshold: u32,
    pub probe_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignored_apps: vec![
                "explorer.exe".to_string(),
                "Finder".to_string(),
                "SystemUI".to_string(),
            ],
            categories: default_categories(),
            sampling_interval_seconds: 30,
            idle_threshold_seconds: 300,
            failure_escalation_threshold: 3,
            probe_timeout_ms: 5_000,
        }
    }
}

/// Built-in category table, with window-title heuristics
/// folded into the matching rules.
pub fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "Coding",
            ["vscode", "pycharm", "intellij", "sublime_text", "vim", "atom", "code"],
        )
        .with_titles([
            "code", "script", ".py", ".js", ".html", ".css", ".java", ".go", ".cpp", ".rs",
        ]),
        CategoryRule::new(
            "Communication",
            ["outlook", "thunderbird", "slack", "teams", "discord", "zoom"],
        )
        .with_titles(["email", "mail"]),
        CategoryRule::new("Browsing", ["chrome", "firefox", "safari", "edge"]),
        CategoryRule::new("Documents", ["word", "excel", "powerpoint", "acrobat", "pdf"])
            .with_titles(["document", ".doc", ".txt"]),
        CategoryRule::new(
            "Terminal",
            ["terminal", "cmd", "powershell", "iterm2", "konsole", "alacritty", "kitty"],
        ),
        CategoryRule::new("Design", ["photoshop", "illustrator", "figma", "sketch", "gimp"]),
        CategoryRule::new("Media", ["vlc", "spotify", "itunes", "windows media player"]),
    ]
}

impl Settings {
    /// Checks every constraint the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_interval_seconds == 0 {
            return Err(ConfigError::ZeroSamplingInterval);
        }
        if self.idle_threshold_seconds == 0 {
            return Err(ConfigError::ZeroIdleThreshold);
        }
        if self.idle_threshold_seconds <= self.sampling_interval_seconds {
            return Err(ConfigError::IdleThresholdTooShort {
                idle: self.idle_threshold_seconds,
                interval: self.sampling_interval_seconds,
            });
        }
        if self.idle_threshold_seconds >= SECONDS_PER_DAY {
            return Err(ConfigError::IdleThresholdTooLong(self.idle_threshold_seconds));
        }
        if self.failure_escalation_threshold == 0 {
            return Err(ConfigError::ZeroEscalationThreshold);
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroProbeTimeout);
        }
        if self.ignored_apps.iter().any(|app| app.trim().is_empty()) {
            return Err(ConfigError::EmptyIgnoredApp);
        }

        let mut seen = HashSet::new();
        for rule in &self.categories {
            let name = rule.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyCategoryName);
            }
            if name.eq_ignore_ascii_case(UNCATEGORIZED) || name.eq_ignore_ascii_case(IGNORED) {
                return Err(ConfigError::ReservedCategoryName(rule.name.clone()));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(ConfigError::DuplicateCategory(rule.name.clone()));
            }
            if rule
                .apps
                .iter()
                .chain(&rule.titles)
                .any(|keyword| keyword.trim().is_empty())
            {
                return Err(ConfigError::EmptyKeyword {
                    category: rule.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub const fn sampling_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sampling_interval_seconds)
    }

    pub const fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.probe_timeout_ms)
    }

    /// Idle threshold as a timestamp difference.
    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.idle_threshold_seconds).unwrap_or(i64::MAX))
    }

    pub fn sampling_interval_ms(&self) -> i64 {
        i64::try_from(self.sampling_interval_seconds)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    pub fn categorizer(&self) -> Categorizer {
        Categorizer::new(&self.categories, &self.ignored_apps)
    }
}
