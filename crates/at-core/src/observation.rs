//! Raw foreground-window samples produced by a window probe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single "which window is frontmost" sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Application identifier (process name on Linux, application name on macOS).
    pub app_id: String,
    /// Title of the focused window. May be empty.
    pub window_title: String,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn new(
        app_id: impl Into<String>,
        window_title: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            window_title: window_title.into(),
            timestamp,
        }
    }
}

/// Failure to obtain a usable observation for a tick.
///
/// Every variant is transient: the engine skips the tick and counts it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// A probe helper command could not be run or exited unsuccessfully.
    #[error("probe command `{command}` failed: {message}")]
    Command { command: String, message: String },
    /// No window currently has focus (e.g. locked screen).
    #[error("no foreground window")]
    NoWindow,
    /// The probe did not answer within its time budget.
    #[error("probe timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// The probe answered with output that could not be interpreted.
    #[error("malformed probe output: {0}")]
    Malformed(String),
    /// The observation named no application.
    #[error("observation has an empty app id")]
    EmptyAppId,
    /// The observation's timestamp did not move forward.
    #[error("sample at {timestamp} is not after the previous tick at {previous}")]
    NonMonotonic {
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
    /// No probe exists for this platform.
    #[error("window probing is not supported on {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn observation_serde_roundtrip() {
        let observation = Observation::new(
            "firefox",
            "Rust docs",
            Utc.with_ymd_and_hms(2025, 1, 29, 9, 0, 0).unwrap(),
        );
        let json = serde_json::to_string(&observation).unwrap();
        let parsed: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, observation);
    }

    #[test]
    fn probe_error_messages_name_the_cause() {
        let error = ProbeError::Command {
            command: "xdotool".to_string(),
            message: "not found".to_string(),
        };
        assert_eq!(error.to_string(), "probe command `xdotool` failed: not found");
        assert_eq!(
            ProbeError::Timeout { timeout_ms: 5000 }.to_string(),
            "probe timed out after 5000ms"
        );
    }
}
