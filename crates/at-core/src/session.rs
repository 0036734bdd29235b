//! Categorized activity sessions and local-day boundaries.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::category::Category;

/// A maximal run of ticks with the same category and app, uninterrupted by idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub category: Category,
    pub app_id: String,
    /// Timestamp of the first tick.
    pub start: DateTime<Utc>,
    /// Timestamp of the last tick, or a midnight boundary for split fragments.
    pub end: DateTime<Utc>,
    /// Number of ticks that contributed to the session.
    pub sample_count: u32,
}

impl Session {
    /// Opens a session from a single tick.
    pub fn begin(category: Category, app_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            category,
            app_id: app_id.into(),
            start: at,
            end: at,
            sample_count: 1,
        }
    }

    /// Records another tick of the same activity.
    pub fn extend(&mut self, at: DateTime<Utc>) {
        self.end = at;
        self.sample_count = self.sample_count.saturating_add(1);
    }

    pub fn same_activity(&self, category: &Category, app_id: &str) -> bool {
        self.category == *category && self.app_id == app_id
    }

    /// Wall-clock span between the first and last tick.
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Time the session accounts for when every sample stands for one sampling interval.
    pub fn tracked_ms(&self, interval_ms: i64) -> i64 {
        i64::from(self.sample_count).saturating_mul(interval_ms)
    }

    /// The local calendar date the session starts on.
    pub fn local_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.start.with_timezone(tz).date_naive()
    }

    /// Splits the session at every local midnight it straddles.
    ///
    /// Each fragment keeps the category and app id. The sample count is shared out
    /// in proportion to each fragment's span; every fragment gets at least one
    /// sample and the total is preserved.
    pub fn split_at_midnight<Tz: TimeZone>(self, tz: &Tz) -> Vec<(NaiveDate, Self)> {
        let mut fragments = Vec::new();
        let mut rest = self;
        loop {
            let day = rest.local_date(tz);
            let Some(next_day) = day.succ_opt() else {
                fragments.push((day, rest));
                break;
            };
            let boundary = local_midnight(next_day, tz);
            // Fewer than two samples cannot be shared between two fragments. Ticks
            // closer together than the idle threshold (< 1 day) make this unreachable.
            if rest.end < boundary || rest.sample_count < 2 {
                fragments.push((day, rest));
                break;
            }

            let head_count = share_samples(
                rest.sample_count,
                (boundary - rest.start).num_milliseconds(),
                rest.span().num_milliseconds(),
            );
            let head = Self {
                category: rest.category.clone(),
                app_id: rest.app_id.clone(),
                start: rest.start,
                end: boundary,
                sample_count: head_count,
            };
            rest.start = boundary;
            rest.sample_count -= head_count;
            fragments.push((day, head));
        }
        fragments
    }
}

/// Number of samples the head fragment receives, clamped to `1..total`.
fn share_samples(total: u32, head_ms: i64, whole_ms: i64) -> u32 {
    let max = total.saturating_sub(1).max(1);
    if whole_ms <= 0 {
        return 1;
    }
    let share = (i64::from(total) * head_ms + whole_ms / 2) / whole_ms;
    u32::try_from(share).unwrap_or(max).clamp(1, max)
}

/// The instant local midnight starts `date` in `tz`.
///
/// Handles DST ambiguity by picking the earlier time. If midnight does not exist
/// (spring-forward gap), 1am local is used instead.
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    if let Some(dt) = tz.from_local_datetime(&midnight).earliest() {
        return dt.with_timezone(&Utc);
    }
    let one_am = midnight + Duration::hours(1);
    tz.from_local_datetime(&one_am)
        .earliest()
        .map_or_else(|| one_am.and_utc(), |dt| dt.with_timezone(&Utc))
}
