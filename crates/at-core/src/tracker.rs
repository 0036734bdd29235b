//! The sampling loop.
//!
//! Drives probe → idle detector → engine at the configured interval until the
//! cancellation token fires, then flushes the engine.

use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineWarning, Sample, SessionEngine, Transition};
use crate::idle::update_idle;
use crate::observation::ProbeError;
use crate::probe::WindowProbe;
use crate::session::Session;
use crate::settings::Settings;
use crate::store::SessionStore;

/// What a tracking run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSummary {
    /// Ticks processed, including skipped ones.
    pub ticks: u64,
    /// Ticks skipped because the probe failed.
    pub skipped: u64,
    /// The date whose day log is reported.
    pub date: NaiveDate,
    /// Day log of `date` as recorded by this run.
    pub day_log: Vec<Session>,
    /// Days before `date` this run also recorded sessions on.
    pub earlier_days: Vec<NaiveDate>,
    /// Closed sessions the store has not accepted yet.
    pub unsaved: usize,
}

/// Runs the sampling loop until `cancel` fires.
///
/// Probe failures never stop the loop. Warnings the engine raises are passed to
/// `on_warning` as they happen.
pub async fn run<P, S, Tz>(
    probe: &mut P,
    engine: &mut SessionEngine<S, Tz>,
    settings: &Settings,
    cancel: &CancellationToken,
    mut on_warning: impl FnMut(&EngineWarning),
) -> TrackerSummary
where
    P: WindowProbe,
    S: SessionStore,
    Tz: TimeZone,
{
    let probe_timeout = settings.probe_timeout();
    let idle_threshold = settings.idle_threshold();
    let mut ticker = tokio::time::interval(settings.sampling_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks = 0_u64;
    let mut skipped = 0_u64;

    tracing::info!(
        interval_secs = settings.sampling_interval_seconds,
        idle_threshold_secs = settings.idle_threshold_seconds,
        "tracking started"
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let sample = sample_once(probe, probe_timeout, idle_threshold).await;
                let report = engine.tick(sample);
                ticks += 1;
                if report.transition == Transition::Skipped {
                    skipped += 1;
                }
                for warning in &report.warnings {
                    on_warning(warning);
                }
            }
            () = cancel.cancelled() => {
                tracing::info!("tracking loop shutting down");
                break;
            }
        }
    }

    let date = engine
        .last_tick()
        .map_or_else(|| engine.today(), |at| engine.local_date(at));
    let day_log = engine.flush(date);
    let earlier_days = engine.touched_days().filter(|day| *day < date).collect();
    let unsaved = engine.pending_writes();
    if unsaved > 0 {
        tracing::warn!(unsaved, "sessions could not be saved before exit");
    }
    TrackerSummary {
        ticks,
        skipped,
        date,
        day_log,
        earlier_days,
        unsaved,
    }
}

/// Takes one reading: the focused window, then the idle state at its timestamp.
async fn sample_once<P: WindowProbe>(
    probe: &mut P,
    timeout: Duration,
    idle_threshold: chrono::Duration,
) -> Result<Sample, ProbeError> {
    let observation = bounded(timeout, probe.sample()).await?;
    let last_input = bounded(timeout, probe.last_input_time()).await?;
    let idle = update_idle(last_input, observation.timestamp, idle_threshold);
    Ok(Sample { observation, idle })
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ProbeError>>,
) -> Result<T, ProbeError> {
    tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
        Err(ProbeError::Timeout {
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::category::{Category, CategoryRule};
    use crate::observation::Observation;
    use crate::store::MemoryStore;

    const T0: i64 = 1_738_137_600; // 2025-01-29T08:00:00Z

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(T0 + secs, 0).unwrap()
    }

    enum Step {
        Window { app: &'static str, secs: i64, last_input: i64 },
        Fail,
        Hang,
    }

    /// Replays a fixed script, then cancels the run.
    struct ScriptedProbe {
        steps: VecDeque<Step>,
        last_input: Option<i64>,
        cancel: CancellationToken,
    }

    impl ScriptedProbe {
        fn new(steps: impl IntoIterator<Item = Step>, cancel: &CancellationToken) -> Self {
            Self {
                steps: steps.into_iter().collect(),
                last_input: None,
                cancel: cancel.clone(),
            }
        }
    }

    impl WindowProbe for ScriptedProbe {
        async fn sample(&mut self) -> Result<Observation, ProbeError> {
            let step = self.steps.pop_front();
            if self.steps.is_empty() {
                self.cancel.cancel();
            }
            match step {
                Some(Step::Window {
                    app,
                    secs,
                    last_input,
                }) => {
                    self.last_input = Some(last_input);
                    Ok(Observation::new(app, "", at(secs)))
                }
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProbeError::NoWindow)
                }
                Some(Step::Fail) | None => Err(ProbeError::NoWindow),
            }
        }

        async fn last_input_time(&mut self) -> Result<DateTime<Utc>, ProbeError> {
            self.last_input.take().map(at).ok_or(ProbeError::NoWindow)
        }
    }

    fn settings() -> Settings {
        Settings {
            ignored_apps: Vec::new(),
            categories: vec![
                CategoryRule::new("Coding", ["vscode"]),
                CategoryRule::new("Communication", ["slack"]),
            ],
            sampling_interval_seconds: 30,
            idle_threshold_seconds: 300,
            failure_escalation_threshold: 3,
            probe_timeout_ms: 1000,
        }
    }

    fn window(app: &'static str, secs: i64) -> Step {
        Step::Window {
            app,
            secs,
            last_input: secs,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_records_sessions_and_flushes_on_cancel() {
        let cancel = CancellationToken::new();
        let mut probe = ScriptedProbe::new(
            [
                window("vscode", 0),
                window("vscode", 30),
                window("vscode", 60),
                Step::Window {
                    app: "vscode",
                    secs: 90,
                    last_input: -310,
                },
                window("slack", 500),
            ],
            &cancel,
        );
        let mut engine = SessionEngine::new(&settings(), MemoryStore::new(), Utc).unwrap();

        let summary = run(&mut probe, &mut engine, &settings(), &cancel, |_| {}).await;

        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2025, 1, 29).unwrap());
        assert_eq!(summary.unsaved, 0);
        let recorded: Vec<_> = summary
            .day_log
            .iter()
            .map(|s| (s.category.clone(), s.app_id.as_str(), s.sample_count))
            .collect();
        assert_eq!(
            recorded,
            [
                (Category::Named("Coding".to_string()), "vscode", 3),
                (Category::Named("Communication".to_string()), "slack", 1),
            ]
        );
        assert_eq!(engine.store().len(), 2);
        assert!(summary.earlier_days.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_across_midnight_lists_earlier_days() {
        const LATE: i64 = 15 * 3600 + 59 * 60; // 2025-01-29T23:59:00Z
        let cancel = CancellationToken::new();
        let mut probe = ScriptedProbe::new(
            [
                window("vscode", LATE),
                window("slack", LATE + 30),
                window("slack", LATE + 60),
                window("slack", LATE + 90),
            ],
            &cancel,
        );
        let mut engine = SessionEngine::new(&settings(), MemoryStore::new(), Utc).unwrap();

        let summary = run(&mut probe, &mut engine, &settings(), &cancel, |_| {}).await;

        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2025, 1, 30).unwrap());
        assert_eq!(
            summary.earlier_days,
            [NaiveDate::from_ymd_opt(2025, 1, 29).unwrap()]
        );
        assert_eq!(summary.day_log.len(), 1);
        assert_eq!(summary.day_log[0].app_id, "slack");
        assert_eq!(engine.store().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_escalate_once_and_do_not_stop_the_loop() {
        let cancel = CancellationToken::new();
        let mut probe = ScriptedProbe::new(
            [
                Step::Fail,
                Step::Fail,
                Step::Fail,
                Step::Fail,
                window("vscode", 0),
            ],
            &cancel,
        );
        let mut engine = SessionEngine::new(&settings(), MemoryStore::new(), Utc).unwrap();
        let mut warnings = Vec::new();

        let summary = run(&mut probe, &mut engine, &settings(), &cancel, |w| {
            warnings.push(w.to_string());
        })
        .await;

        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.skipped, 4);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("window probe failed 3 times in a row"));
        assert_eq!(summary.day_log.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_times_out_and_is_skipped() {
        let cancel = CancellationToken::new();
        let mut probe = ScriptedProbe::new([Step::Hang, window("vscode", 0)], &cancel);
        let mut engine = SessionEngine::new(&settings(), MemoryStore::new(), Utc).unwrap();

        let summary = run(&mut probe, &mut engine, &settings(), &cancel, |_| {}).await;

        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.day_log.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_takes_no_ticks() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut probe = ScriptedProbe::new([window("vscode", 0)], &cancel);
        let mut engine = SessionEngine::new(&settings(), MemoryStore::new(), Utc).unwrap();

        let summary = run(&mut probe, &mut engine, &settings(), &cancel, |_| {}).await;

        assert_eq!(summary.ticks, 0);
        assert!(summary.day_log.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_maps_elapsed_to_timeout() {
        let result: Result<(), ProbeError> = bounded(Duration::from_millis(250), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(ProbeError::Timeout { timeout_ms: 250 }));
    }
}
