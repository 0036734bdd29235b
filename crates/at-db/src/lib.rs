//! Storage layer for the activity tracker.
//!
//! Persists closed sessions using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved to the sampling loop but not shared across threads
//! without external synchronization.
//!
//! # Schema
//!
//! One row per closed session (or midnight fragment of one). The `day` column is
//! the local calendar date the engine filed the session under, as `YYYY-MM-DD`.
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g., `2025-01-29T10:30:00.000Z`), so lexicographic ordering matches
//! chronological ordering.
//!
//! ## Categories
//!
//! Category names are stored verbatim; sessions that matched no rule are stored
//! under the reserved name `Uncategorized`.

use std::path::Path;

use at_core::{Category, Session, SessionStore, StoreError};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored session timestamp.
    #[error("invalid timestamp for session {session_id}: {timestamp}")]
    TimestampParse {
        session_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Failed to parse a stored day.
    #[error("invalid day for session {session_id}: {day}")]
    DayParse {
        session_id: i64,
        day: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .finish()
    }
}

/// Row as read from the `sessions` table, before parsing.
struct SessionRow {
    id: i64,
    day: String,
    category: String,
    app_id: String,
    start_at: String,
    end_at: String,
    sample_count: u32,
}

const SESSION_COLUMNS: &str = "id, day, category, app_id, start_at, end_at, sample_count";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- sessions: one closed session (or midnight fragment) per row
            -- day: local calendar date, YYYY-MM-DD
            -- start_at / end_at: RFC 3339 UTC, millisecond precision
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY,
                day TEXT NOT NULL,
                category TEXT NOT NULL CHECK (category <> ''),
                app_id TEXT NOT NULL CHECK (app_id <> ''),
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                sample_count INTEGER NOT NULL CHECK (sample_count >= 1),
                CHECK (start_at <= end_at)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_day_start ON sessions(day, start_at);
            ",
        )?;
        Ok(())
    }

    /// Appends a closed session under `day`. Returns the new row id.
    pub fn append_session(&self, day: NaiveDate, session: &Session) -> Result<i64, DbError> {
        self.conn.execute(
            "
            INSERT INTO sessions (day, category, app_id, start_at, end_at, sample_count)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
            params![
                day.to_string(),
                session.category.as_str(),
                session.app_id,
                format_timestamp(session.start),
                format_timestamp(session.end),
                session.sample_count,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(id, %day, app = %session.app_id, "session stored");
        Ok(id)
    }

    /// Lists the sessions of one day, ordered by start.
    pub fn load_day(&self, day: NaiveDate) -> Result<Vec<Session>, DbError> {
        self.load_range(day, day)
    }

    /// Lists the sessions of every day in `start..=end`, ordered by start.
    pub fn load_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Session>, DbError> {
        if end < start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE day >= ? AND day <= ?
            ORDER BY start_at ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map([start.to_string(), end.to_string()], read_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            let (_, session) = parse_row(row?)?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    /// First and last day with recorded sessions, if any.
    pub fn recorded_days(&self) -> Result<Option<(NaiveDate, NaiveDate)>, DbError> {
        let (first, last): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(day), MAX(day) FROM sessions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (Some(first), Some(last)) = (first, last) else {
            return Ok(None);
        };
        Ok(Some((parse_day(&first, 0)?, parse_day(&last, 0)?)))
    }

    /// Number of distinct days with recorded sessions.
    pub fn day_count(&self) -> Result<usize, DbError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT day) FROM sessions", [], |row| {
                    row.get(0)
                })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// The most recently ended session and the day it is filed under.
    pub fn last_session(&self) -> Result<Option<(NaiveDate, Session)>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY end_at DESC, id DESC LIMIT 1"
                ),
                [],
                read_row,
            )
            .optional()?;
        row.map(parse_row).transpose()
    }
}

impl SessionStore for Database {
    fn append(&mut self, date: NaiveDate, session: &Session) -> Result<(), StoreError> {
        self.append_session(date, session)?;
        Ok(())
    }

    fn load_day(&self, date: NaiveDate) -> Result<Vec<Session>, StoreError> {
        Ok(Self::load_day(self, date)?)
    }

    fn load_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Session>, StoreError> {
        Ok(Self::load_range(self, start, end)?)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        day: row.get(1)?,
        category: row.get(2)?,
        app_id: row.get(3)?,
        start_at: row.get(4)?,
        end_at: row.get(5)?,
        sample_count: row.get(6)?,
    })
}

fn parse_row(row: SessionRow) -> Result<(NaiveDate, Session), DbError> {
    let day = parse_day(&row.day, row.id)?;
    let session = Session {
        category: Category::from_stored(&row.category),
        app_id: row.app_id,
        start: parse_timestamp(&row.start_at, row.id)?,
        end: parse_timestamp(&row.end_at, row.id)?,
        sample_count: row.sample_count,
    };
    Ok((day, session))
}

fn parse_day(day: &str, session_id: i64) -> Result<NaiveDate, DbError> {
    day.parse().map_err(|source| DbError::DayParse {
        session_id,
        day: day.to_string(),
        source,
    })
}

fn parse_timestamp(timestamp: &str, session_id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            session_id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
