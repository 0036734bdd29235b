//! Persistence boundary for closed sessions.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::session::Session;

/// Session store errors.
///
/// Store failures are never fatal to tracking: the engine keeps the affected
/// sessions queued and retries them on the next close or flush.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the operation.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    /// An error from the storage backend.
    #[error("session store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Append-only storage of closed sessions, keyed by local date.
///
/// This trait lets the engine work with different backends
/// (e.g., the `SQLite` database in `at-db`, or [`MemoryStore`] in tests).
pub trait SessionStore {
    /// Persists one closed session under `date`.
    fn append(&mut self, date: NaiveDate, session: &Session) -> Result<(), StoreError>;

    /// Returns the sessions of one date, ordered by start.
    fn load_day(&self, date: NaiveDate) -> Result<Vec<Session>, StoreError>;

    /// Returns the sessions of all dates in `start..=end`, ordered by start.
    fn load_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Session>, StoreError>;
}

/// A store that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    days: BTreeMap<NaiveDate, Vec<Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored sessions.
    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.values().all(Vec::is_empty)
    }
}

impl SessionStore for MemoryStore {
    fn append(&mut self, date: NaiveDate, session: &Session) -> Result<(), StoreError> {
        let day = self.days.entry(date).or_default();
        day.push(session.clone());
        day.sort_by_key(|s| s.start);
        Ok(())
    }

    fn load_day(&self, date: NaiveDate) -> Result<Vec<Session>, StoreError> {
        Ok(self.days.get(&date).cloned().unwrap_or_default())
    }

    fn load_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Session>, StoreError> {
        if end < start {
            return Ok(Vec::new());
        }
        Ok(self
            .days
            .range(start..=end)
            .flat_map(|(_, sessions)| sessions.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use chrono::{TimeZone, Utc};

    fn session(day: u32, hour: u32) -> Session {
        Session::begin(
            Category::Uncategorized,
            "gedit",
            Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap(),
        )
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn load_day_returns_sessions_in_start_order() {
        let mut store = MemoryStore::new();
        store.append(date(29), &session(29, 11)).unwrap();
        store.append(date(29), &session(29, 9)).unwrap();

        let day = store.load_day(date(29)).unwrap();
        let hours: Vec<_> = day.iter().map(|s| s.start.format("%H").to_string()).collect();
        assert_eq!(hours, ["09", "11"]);
        assert!(store.load_day(date(30)).unwrap().is_empty());
    }

    #[test]
    fn load_range_is_inclusive() {
        let mut store = MemoryStore::new();
        for day in 27..=31 {
            store.append(date(day), &session(day, 9)).unwrap();
        }
        assert_eq!(store.load_range(date(28), date(30)).unwrap().len(), 3);
        assert!(store.load_range(date(30), date(28)).unwrap().is_empty());
        assert_eq!(store.len(), 5);
    }
}
