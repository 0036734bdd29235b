//! The sampling-to-session state machine.
//!
//! The engine consumes one [`Sample`] (or probe failure) per tick and maintains
//! a non-overlapping, per-day log of closed [`Session`]s.
//!
//! # Tick Evaluation
//!
//! Rules are applied in order; the first that applies decides the tick:
//!
//! 1. Probe failure (including empty app ids and timestamps that do not move
//!    forward): the tick is skipped and counted. Reaching the escalation threshold
//!    raises exactly one warning per failure streak.
//! 2. Ignored app: the open session closes; no session starts.
//! 3. Idle: the open session closes at its last active tick, never at the tick
//!    that detected idleness.
//! 4. Gap: an open session whose last tick is at least the idle threshold ago
//!    closes before the tick is applied (e.g. after suspend).
//! 5. Same `(category, app_id)`: the open session is extended.
//! 6. Different activity: the open session closes at the previous tick and a new
//!    one opens at this tick.
//! 7. Nothing open: a new session opens.
//!
//! Closed sessions are split at local midnight, appended to the in-memory day log
//! and handed to the [`SessionStore`]. Writes that fail stay queued and are
//! retried, in order, on the next close or flush. Day logs of earlier days are
//! dropped from memory once the clock has moved past them and every session of
//! theirs is saved; the store is the record from then on.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};

use crate::category::Categorizer;
use crate::idle::IdleState;
use crate::observation::{Observation, ProbeError};
use crate::session::Session;
use crate::settings::{ConfigError, Settings};
use crate::store::{SessionStore, StoreError};

/// One successful probe reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub observation: Observation,
    pub idle: IdleState,
}

/// What a tick did to the engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Probe failure; nothing changed.
    Skipped,
    /// Ignored app; any open session was closed.
    Ignored,
    /// The user just went idle; any open session was closed.
    IdleStarted,
    /// The user is still idle.
    StillIdle,
    /// The open session absorbed the tick.
    Extended,
    /// The open session was closed and a new one opened.
    Switched,
    /// A session opened with nothing open before.
    Started,
}

/// Non-fatal problems surfaced to the caller of the tick loop.
#[derive(Debug)]
pub enum EngineWarning {
    /// The probe has failed `consecutive` ticks in a row.
    ProbeFailures {
        consecutive: u32,
        last_error: ProbeError,
    },
    /// A closed session could not be persisted; `pending` writes are queued.
    StoreFailure { pending: usize, error: StoreError },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeFailures {
                consecutive,
                last_error,
            } => write!(
                f,
                "window probe failed {consecutive} times in a row (last error: {last_error})"
            ),
            Self::StoreFailure { pending, error } => {
                write!(f, "{error}; {pending} session(s) waiting to be saved")
            }
        }
    }
}

/// Outcome of a single tick.
#[derive(Debug)]
pub struct TickReport {
    pub transition: Transition,
    pub warnings: Vec<EngineWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineState {
    NoSession,
    Open(Session),
}

/// Turns ticks into sessions. `Tz` decides where calendar days begin.
pub struct SessionEngine<S, Tz: TimeZone = Local> {
    categorizer: Categorizer,
    idle_threshold: Duration,
    escalation_threshold: u32,
    tz: Tz,
    store: S,
    state: EngineState,
    idle: bool,
    last_tick: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    day_logs: BTreeMap<NaiveDate, Vec<Session>>,
    /// Every date a closed session was recorded on during this run.
    touched: BTreeSet<NaiveDate>,
    unsaved: VecDeque<(NaiveDate, Session)>,
}

impl<S: fmt::Debug, Tz: TimeZone> fmt::Debug for SessionEngine<S, Tz> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("state", &self.state)
            .field("idle", &self.idle)
            .field("last_tick", &self.last_tick)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("day_logs", &self.day_logs.len())
            .field("unsaved", &self.unsaved.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<S: SessionStore, Tz: TimeZone> SessionEngine<S, Tz> {
    /// Creates an engine after validating `settings`.
    pub fn new(settings: &Settings, store: S, tz: Tz) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            categorizer: settings.categorizer(),
            idle_threshold: settings.idle_threshold(),
            escalation_threshold: settings.failure_escalation_threshold,
            tz,
            store,
            state: EngineState::NoSession,
            idle: false,
            last_tick: None,
            consecutive_failures: 0,
            day_logs: BTreeMap::new(),
            touched: BTreeSet::new(),
            unsaved: VecDeque::new(),
        })
    }

    /// Processes one tick.
    pub fn tick(&mut self, sample: Result<Sample, ProbeError>) -> TickReport {
        let mut warnings = Vec::new();
        let sample = match sample.and_then(|sample| self.check_sample(sample)) {
            Ok(sample) => sample,
            Err(error) => {
                self.record_failure(error, &mut warnings);
                return TickReport {
                    transition: Transition::Skipped,
                    warnings,
                };
            }
        };

        self.consecutive_failures = 0;
        self.last_tick = Some(sample.observation.timestamp);
        let transition = self.apply(&sample, &mut warnings);
        self.prune_day_logs(self.local_date(sample.observation.timestamp));
        tracing::debug!(
            app = %sample.observation.app_id,
            at = %sample.observation.timestamp,
            ?transition,
            "tick processed"
        );
        TickReport {
            transition,
            warnings,
        }
    }

    fn check_sample(&self, sample: Sample) -> Result<Sample, ProbeError> {
        if sample.observation.app_id.trim().is_empty() {
            return Err(ProbeError::EmptyAppId);
        }
        if let Some(previous) = self.last_tick {
            if sample.observation.timestamp <= previous {
                return Err(ProbeError::NonMonotonic {
                    timestamp: sample.observation.timestamp,
                    previous,
                });
            }
        }
        Ok(sample)
    }

    fn record_failure(&mut self, error: ProbeError, warnings: &mut Vec<EngineWarning>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        tracing::debug!(%error, consecutive = self.consecutive_failures, "skipping tick");
        if self.consecutive_failures == self.escalation_threshold {
            tracing::warn!(
                %error,
                consecutive = self.consecutive_failures,
                "window probe keeps failing; tracking continues"
            );
            warnings.push(EngineWarning::ProbeFailures {
                consecutive: self.consecutive_failures,
                last_error: error,
            });
        }
    }

    fn apply(&mut self, sample: &Sample, warnings: &mut Vec<EngineWarning>) -> Transition {
        let at = sample.observation.timestamp;
        let app_id = sample.observation.app_id.as_str();
        let label = self.categorizer.classify(&sample.observation);

        let Some(category) = label.into_category() else {
            self.idle = sample.idle.is_idle;
            self.close_open(warnings);
            return Transition::Ignored;
        };

        if sample.idle.is_idle {
            let was_idle = std::mem::replace(&mut self.idle, true);
            self.close_open(warnings);
            return if was_idle {
                Transition::StillIdle
            } else {
                Transition::IdleStarted
            };
        }
        self.idle = false;

        let gap = self
            .current()
            .is_some_and(|session| at - session.end >= self.idle_threshold);
        if gap {
            tracing::debug!(%at, "closing session across tick gap");
            self.close_open(warnings);
        }

        if let EngineState::Open(session) = &mut self.state {
            if session.same_activity(&category, app_id) {
                session.extend(at);
                return Transition::Extended;
            }
        }

        let switched = self.close_open(warnings);
        self.state = EngineState::Open(Session::begin(category, app_id, at));
        if switched {
            Transition::Switched
        } else {
            Transition::Started
        }
    }

    /// Closes the open session, if any. Returns whether one was open.
    fn close_open(&mut self, warnings: &mut Vec<EngineWarning>) -> bool {
        match std::mem::replace(&mut self.state, EngineState::NoSession) {
            EngineState::Open(session) => {
                self.commit(session, warnings);
                true
            }
            EngineState::NoSession => false,
        }
    }

    fn commit(&mut self, session: Session, warnings: &mut Vec<EngineWarning>) {
        tracing::debug!(
            category = %session.category,
            app = %session.app_id,
            start = %session.start,
            end = %session.end,
            samples = session.sample_count,
            "session closed"
        );
        for (day, fragment) in session.split_at_midnight(&self.tz) {
            self.day_logs.entry(day).or_default().push(fragment.clone());
            self.touched.insert(day);
            self.unsaved.push_back((day, fragment));
        }
        self.persist(warnings);
    }

    /// Writes queued sessions in order, stopping at the first failure.
    fn persist(&mut self, warnings: &mut Vec<EngineWarning>) {
        while let Some((day, session)) = self.unsaved.front() {
            match self.store.append(*day, session) {
                Ok(()) => {
                    self.unsaved.pop_front();
                }
                Err(error) => {
                    tracing::warn!(%error, pending = self.unsaved.len(), "failed to save session");
                    warnings.push(EngineWarning::StoreFailure {
                        pending: self.unsaved.len(),
                        error,
                    });
                    break;
                }
            }
        }
    }

    /// Drops day logs before `today` whose sessions are all saved.
    fn prune_day_logs(&mut self, today: NaiveDate) {
        let oldest_unsaved = self.unsaved.iter().map(|(day, _)| *day).min();
        let keep_from = oldest_unsaved.map_or(today, |day| day.min(today));
        if self.day_logs.first_key_value().is_some_and(|(day, _)| *day < keep_from) {
            self.day_logs = self.day_logs.split_off(&keep_from);
            tracing::debug!(%keep_from, "dropped saved day logs of earlier days");
        }
    }

    /// Closes any open session, retries queued writes, and returns the day log of
    /// `date` as recorded during this run.
    ///
    /// Calling it again without intervening ticks returns the same log. Logs of
    /// days before the last tick's date may already have been dropped; read those
    /// through [`Self::query_range`].
    pub fn flush(&mut self, date: NaiveDate) -> Vec<Session> {
        let mut warnings = Vec::new();
        self.close_open(&mut warnings);
        if warnings.is_empty() {
            self.persist(&mut warnings);
        }
        for warning in &warnings {
            tracing::warn!(%warning, "flush could not save every session");
        }
        self.day_logs.get(&date).cloned().unwrap_or_default()
    }

    /// Sessions of `start..=end` from the store plus any still waiting to be saved.
    pub fn query_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.store.load_range(start, end)?;
        sessions.extend(
            self.unsaved
                .iter()
                .filter(|(day, _)| (start..=end).contains(day))
                .map(|(_, session)| session.clone()),
        );
        sessions.sort_by_key(|session| (session.start, session.end));
        Ok(sessions)
    }

    /// The session currently open, if any.
    pub fn current(&self) -> Option<&Session> {
        match &self.state {
            EngineState::Open(session) => Some(session),
            EngineState::NoSession => None,
        }
    }

    /// Whether the last accepted tick was idle.
    pub const fn is_idle(&self) -> bool {
        self.idle
    }

    /// Dates this run recorded sessions on, oldest first.
    pub fn touched_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.touched.iter().copied()
    }

    /// Number of closed sessions not yet accepted by the store.
    pub fn pending_writes(&self) -> usize {
        self.unsaved.len()
    }

    /// Timestamp of the last accepted tick.
    pub const fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.last_tick
    }

    /// The calendar date of `at` in the engine's time zone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    pub const fn store(&self) -> &S {
        &self.store
    }
}
