//! Usage aggregation over recorded sessions.
//!
//! Every sample stands for one sampling interval, so the tracked time of a
//! session is `sample_count × interval`. Totals are sorted by time descending,
//! ties broken by name.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::category::Category;
use crate::session::Session;

/// Tracked time attributed to one category or app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEntry {
    pub name: String,
    pub tracked_ms: i64,
    pub sessions: usize,
}

/// Tracked time of one recorded day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayTotal {
    pub date: NaiveDate,
    pub tracked_ms: i64,
    pub sessions: usize,
}

/// A session in the daily timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    /// Local hour of day the session started in.
    pub hour: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub category: Category,
    pub app_id: String,
    pub tracked_ms: i64,
}

/// Aggregated usage over a set of sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub total_ms: i64,
    pub session_count: usize,
    pub by_category: Vec<UsageEntry>,
    pub by_app: Vec<UsageEntry>,
    pub by_day: Vec<DayTotal>,
}

#[derive(Default)]
struct Tally {
    tracked_ms: i64,
    sessions: usize,
}

impl Tally {
    fn add(&mut self, ms: i64) {
        self.tracked_ms = self.tracked_ms.saturating_add(ms);
        self.sessions += 1;
    }
}

impl UsageSummary {
    /// Aggregates `sessions`, assigning each to the local date it starts on.
    pub fn from_sessions<Tz: TimeZone>(sessions: &[Session], interval_ms: i64, tz: &Tz) -> Self {
        let mut categories: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut apps: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut days: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
        let mut total_ms = 0_i64;

        for session in sessions {
            let ms = session.tracked_ms(interval_ms);
            total_ms = total_ms.saturating_add(ms);
            categories.entry(session.category.as_str()).or_default().add(ms);
            apps.entry(session.app_id.as_str()).or_default().add(ms);
            days.entry(session.local_date(tz)).or_default().add(ms);
        }

        Self {
            total_ms,
            session_count: sessions.len(),
            by_category: ranked(categories),
            by_app: ranked(apps),
            by_day: days
                .into_iter()
                .map(|(date, tally)| DayTotal {
                    date,
                    tracked_ms: tally.tracked_ms,
                    sessions: tally.sessions,
                })
                .collect(),
        }
    }

    /// Share of the total, in percent.
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_of_total(&self, tracked_ms: i64) -> f64 {
        if self.total_ms <= 0 {
            return 0.0;
        }
        tracked_ms as f64 / self.total_ms as f64 * 100.0
    }

    /// The `n` apps with the most tracked time.
    pub fn top_apps(&self, n: usize) -> &[UsageEntry] {
        &self.by_app[..n.min(self.by_app.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.session_count == 0
    }
}

fn ranked(tallies: BTreeMap<&str, Tally>) -> Vec<UsageEntry> {
    let mut entries: Vec<_> = tallies
        .into_iter()
        .map(|(name, tally)| UsageEntry {
            name: name.to_string(),
            tracked_ms: tally.tracked_ms,
            sessions: tally.sessions,
        })
        .collect();
    // BTreeMap order already sorts names; a stable sort keeps it for ties.
    entries.sort_by_key(|entry| std::cmp::Reverse(entry.tracked_ms));
    entries
}

/// Sessions tracked for at least `min_ms`, in start order, tagged with their local hour.
pub fn timeline<Tz: TimeZone>(
    sessions: &[Session],
    interval_ms: i64,
    min_ms: i64,
    tz: &Tz,
) -> Vec<TimelineEntry> {
    let mut entries: Vec<_> = sessions
        .iter()
        .filter(|session| session.tracked_ms(interval_ms) >= min_ms)
        .map(|session| TimelineEntry {
            hour: session.start.with_timezone(tz).hour(),
            start: session.start,
            end: session.end,
            category: session.category.clone(),
            app_id: session.app_id.clone(),
            tracked_ms: session.tracked_ms(interval_ms),
        })
        .collect();
    entries.sort_by_key(|entry| entry.start);
    entries
}
