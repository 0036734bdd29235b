//! Track command: runs the sampling loop until Ctrl-C or SIGTERM.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use at_core::tracker::{self, TrackerSummary};
use at_core::{SessionEngine, UsageSummary};
use at_db::Database;
use chrono::{Local, TimeZone};
use fs2::FileExt;
use tokio_util::sync::CancellationToken;

use super::report::{format_duration, write_heading, write_usage_table};
use crate::Config;
use crate::probe::SystemProbe;

const LOCK_FILE: &str = "atrack.lock";

/// Takes the tracker lock in `data_dir`. Held until the returned file is dropped.
fn acquire_lock(data_dir: &Path) -> Result<File> {
    std::fs::create_dir_all(data_dir).context("failed to create data directory")?;
    let path = data_dir.join(LOCK_FILE);
    let lock_file = File::create(&path)
        .with_context(|| format!("failed to create lock file {}", path.display()))?;
    lock_file
        .try_lock_exclusive()
        .context("another tracker is already running")?;
    Ok(lock_file)
}

/// Cancels `cancel` on Ctrl-C or, on Unix, SIGTERM.
async fn wait_for_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("received Ctrl-C"),
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGTERM handler; only Ctrl-C stops tracking");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl-C");
    }

    cancel.cancel();
}

/// Formats the end-of-run summary.
pub fn format_track_summary<Tz: TimeZone>(
    summary: &TrackerSummary,
    interval_ms: i64,
    tz: &Tz,
) -> String {
    use std::fmt::Write as _;

    let mut output = String::new();
    let _ = writeln!(
        output,
        "Tracking stopped after {} samples ({} skipped).",
        summary.ticks, summary.skipped
    );

    let usage = UsageSummary::from_sessions(&summary.day_log, interval_ms, tz);
    if usage.is_empty() {
        let _ = writeln!(output, "No sessions recorded for {}.", summary.date);
    } else {
        write_heading(&mut output, &format!("RECORDED ON {}", summary.date));
        write_usage_table(&mut output, &usage.by_category, &usage, true);
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "{} sessions, {} tracked.",
            usage.session_count,
            format_duration(usage.total_ms)
        );
    }

    if !summary.earlier_days.is_empty() {
        let days: Vec<_> = summary.earlier_days.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            output,
            "Also recorded on {} (see 'atrack report --date <day>').",
            days.join(", ")
        );
    }

    if summary.unsaved > 0 {
        let _ = writeln!(
            output,
            "WARNING: {} session(s) could not be saved to the database.",
            summary.unsaved
        );
    }
    output
}

/// Runs the track command.
pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let settings = config.tracker_settings();
    settings.validate().context("invalid tracker settings")?;

    let _lock = acquire_lock(config.data_dir())?;
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let mut engine = SessionEngine::new(&settings, db, Local)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    writeln!(
        writer,
        "Tracking every {}s (idle after {}s). Press Ctrl-C to stop.",
        settings.sampling_interval_seconds, settings.idle_threshold_seconds
    )?;
    writer.flush()?;

    let summary = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let shutdown = tokio::spawn(wait_for_shutdown(cancel.clone()));
        let mut probe = SystemProbe::new();

        let summary = tracker::run(&mut probe, &mut engine, &settings, &cancel, |warning| {
            eprintln!("warning: {warning}");
        })
        .await;

        shutdown.abort();
        summary
    });

    write!(
        writer,
        "{}",
        format_track_summary(&summary, settings.sampling_interval_ms(), &Local)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_core::{Category, Session};
    use chrono::{NaiveDate, Utc};
    use insta::assert_snapshot;

    fn summary(day_log: Vec<Session>, unsaved: usize) -> TrackerSummary {
        TrackerSummary {
            ticks: 42,
            skipped: 2,
            date: NaiveDate::from_ymd_opt(2025, 1, 29).unwrap(),
            day_log,
            earlier_days: Vec::new(),
            unsaved,
        }
    }

    #[test]
    fn summary_lists_recorded_categories() {
        let start = Utc.with_ymd_and_hms(2025, 1, 29, 9, 0, 0).unwrap();
        let mut coding = Session::begin(Category::Named("Coding".to_string()), "code", start);
        for i in 1..30 {
            coding.extend(start + chrono::Duration::seconds(30 * i));
        }
        let slack = Session::begin(
            Category::Named("Communication".to_string()),
            "slack",
            start + chrono::Duration::minutes(20),
        );

        let output = format_track_summary(&summary(vec![coding, slack], 1), 30_000, &Utc);
        assert_snapshot!(output, @r"
        Tracking stopped after 42 samples (2 skipped).

        RECORDED ON 2025-01-29
        ──────────────────────
        Coding                       15m   96.8%  ██████████
        Communication                 0m    3.2%  █░░░░░░░░░

        2 sessions, 15m tracked.
        WARNING: 1 session(s) could not be saved to the database.
        ");
    }

    #[test]
    fn summary_without_sessions() {
        let output = format_track_summary(&summary(Vec::new(), 0), 30_000, &Utc);
        assert_snapshot!(output, @r"
        Tracking stopped after 42 samples (2 skipped).
        No sessions recorded for 2025-01-29.
        ");
    }

    #[test]
    fn summary_points_to_earlier_days() {
        let mut summary = summary(Vec::new(), 0);
        summary.earlier_days = vec![
            NaiveDate::from_ymd_opt(2025, 1, 27).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 28).unwrap(),
        ];
        let output = format_track_summary(&summary, 30_000, &Utc);
        assert_snapshot!(output, @r"
        Tracking stopped after 42 samples (2 skipped).
        No sessions recorded for 2025-01-29.
        Also recorded on 2025-01-27, 2025-01-28 (see 'atrack report --date <day>').
        ");
    }

    #[test]
    fn second_tracker_cannot_take_the_lock() {
        let temp = tempfile::tempdir().unwrap();
        let first = acquire_lock(temp.path()).unwrap();
        let err = acquire_lock(temp.path()).unwrap_err();
        assert!(err.to_string().contains("another tracker is already running"));
        drop(first);
        assert!(acquire_lock(temp.path()).is_ok());
    }
}
