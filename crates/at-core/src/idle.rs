//! Idle detection from the time of the last user input.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Whether the user counts as away at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdleState {
    pub is_idle: bool,
    /// The last input time this state was derived from.
    pub since: DateTime<Utc>,
}

impl IdleState {
    /// An active state whose last input is `at`.
    pub const fn active(at: DateTime<Utc>) -> Self {
        Self {
            is_idle: false,
            since: at,
        }
    }
}

/// Computes the idle state at `now`.
///
/// The user is idle once `now - last_input` reaches `threshold` (inclusive).
/// A last input in the future, e.g. after a clock adjustment, counts as zero
/// elapsed time.
pub fn update_idle(last_input: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> IdleState {
    let elapsed = (now - last_input).max(Duration::zero());
    IdleState {
        is_idle: elapsed >= threshold,
        since: last_input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_738_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn recent_input_is_active() {
        let state = update_idle(at(0), at(10), Duration::seconds(300));
        assert!(!state.is_idle);
        assert_eq!(state.since, at(0));
    }

    #[test]
    fn threshold_boundary_is_idle() {
        assert!(update_idle(at(0), at(300), Duration::seconds(300)).is_idle);
        assert!(!update_idle(at(0), at(299), Duration::seconds(300)).is_idle);
    }

    #[test]
    fn elapsed_beyond_threshold_is_idle() {
        assert!(update_idle(at(0), at(400), Duration::seconds(300)).is_idle);
    }

    #[test]
    fn input_in_the_future_is_active() {
        let state = update_idle(at(100), at(0), Duration::seconds(300));
        assert!(!state.is_idle);
    }
}
