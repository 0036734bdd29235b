//! Report command for a single day.
//!
//! This module implements `atrack report` with an optional `--date`, human-readable
//! or JSON output, and `--save` to keep a text copy next to the database. It also
//! holds the formatting helpers shared with `atrack summary`.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use at_core::report::timeline;
use at_core::{TimelineEntry, UsageEntry, UsageSummary};
use at_db::Database;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::Config;

/// Sessions shorter than this are left out of the timeline.
const TIMELINE_MIN_MS: i64 = 60_000;

/// Number of applications listed in the daily report.
const TOP_APPS: usize = 10;

/// Computed report data.
#[derive(Debug)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub timezone: String,
    pub usage: UsageSummary,
    pub timeline: Vec<TimelineEntry>,
}

// ========== Duration Formatting ==========

/// Formats milliseconds as duration string.
/// Returns "Xh Ym" if >= 1 hour, "Xm" if < 1 hour.
/// Negative durations are treated as 0m.
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

/// Writes one `name  duration  pct%  bar` line per entry.
pub(crate) fn write_usage_table(
    output: &mut String,
    entries: &[UsageEntry],
    usage: &UsageSummary,
    with_bar: bool,
) {
    for entry in entries {
        let duration = format_duration(entry.tracked_ms);
        let pct = usage.percent_of_total(entry.tracked_ms);
        let _ = write!(output, "{:<24}{duration:>8}  {pct:>5.1}%", entry.name);
        if with_bar {
            let _ = write!(output, "  {}", progress_bar(entry.tracked_ms, usage.total_ms));
        }
        let _ = writeln!(output);
    }
}

/// Writes a section heading underlined to its width.
pub(crate) fn write_heading(output: &mut String, title: &str) {
    let _ = writeln!(output);
    let _ = writeln!(output, "{title}");
    let _ = writeln!(output, "{}", "─".repeat(title.chars().count()));
}

// ========== Report Generation ==========

/// Builds report data for `date` from already-loaded sessions.
pub fn build_report_data<Tz: TimeZone>(
    sessions: &[at_core::Session],
    date: NaiveDate,
    interval_ms: i64,
    tz: &Tz,
    generated_at: DateTime<Utc>,
) -> ReportData {
    ReportData {
        generated_at,
        date,
        timezone: iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string()),
        usage: UsageSummary::from_sessions(sessions, interval_ms, tz),
        timeline: timeline(sessions, interval_ms, TIMELINE_MIN_MS, tz),
    }
}

/// Generates report data from the database.
pub fn generate_report_data(
    db: &Database,
    date: NaiveDate,
    interval_ms: i64,
    generated_at: DateTime<Utc>,
) -> Result<ReportData> {
    let sessions = db
        .load_day(date)
        .with_context(|| format!("failed to load sessions for {date}"))?;
    Ok(build_report_data(
        &sessions,
        date,
        interval_ms,
        &Local,
        generated_at,
    ))
}

/// Formats the human-readable report output.
pub fn format_report<Tz: TimeZone>(data: &ReportData, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut output = String::new();

    let _ = writeln!(output, "ACTIVITY REPORT: {}", data.date.format("%A, %b %-d, %Y"));

    if data.usage.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No activity recorded on this day.");
        let _ = writeln!(output);
        let _ = writeln!(output, "Hint: Run 'atrack track' to start tracking.");
        return output;
    }

    write_heading(&mut output, "BY CATEGORY");
    write_usage_table(&mut output, &data.usage.by_category, &data.usage, true);

    write_heading(&mut output, "TOP APPLICATIONS");
    write_usage_table(&mut output, data.usage.top_apps(TOP_APPS), &data.usage, false);

    write_heading(&mut output, "TIMELINE");
    if data.timeline.is_empty() {
        let _ = writeln!(output, "(no sessions of a minute or more)");
    }
    let mut current_hour = None;
    for entry in &data.timeline {
        if current_hour != Some(entry.hour) {
            current_hour = Some(entry.hour);
            let _ = writeln!(output, "{:02}:00", entry.hour);
        }
        let start = entry.start.with_timezone(tz).format("%H:%M");
        let end = entry.end.with_timezone(tz).format("%H:%M");
        let _ = writeln!(
            output,
            "  {start}-{end}  {:<16}{:<20}({})",
            entry.category.as_str(),
            entry.app_id,
            format_duration(entry.tracked_ms)
        );
    }

    write_heading(&mut output, "SUMMARY");
    let _ = writeln!(output, "Total tracked:  {}", format_duration(data.usage.total_ms));
    let _ = writeln!(output, "Sessions:       {}", data.usage.session_count);

    output
}

// ========== JSON Output ==========

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: String,
    pub timezone: &'a str,
    pub date: String,
    pub total_ms: i64,
    pub session_count: usize,
    pub by_category: &'a [UsageEntry],
    pub top_apps: &'a [UsageEntry],
    pub timeline: &'a [TimelineEntry],
}

/// Formats report data as JSON.
pub fn format_report_json(data: &ReportData) -> Result<String> {
    let report = JsonReport {
        generated_at: data.generated_at.to_rfc3339(),
        timezone: &data.timezone,
        date: data.date.format("%Y-%m-%d").to_string(),
        total_ms: data.usage.total_ms,
        session_count: data.usage.session_count,
        by_category: &data.usage.by_category,
        top_apps: data.usage.top_apps(TOP_APPS),
        timeline: &data.timeline,
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

// ========== Public Interface ==========

/// Path of the saved text report for `date`.
pub fn saved_report_path(config: &Config, date: NaiveDate) -> PathBuf {
    config
        .data_dir()
        .join(format!("report_{}.txt", date.format("%Y-%m-%d")))
}

/// Runs the report command.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    date: Option<NaiveDate>,
    json: bool,
    save: bool,
) -> Result<()> {
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let interval_ms = config.tracker_settings().sampling_interval_ms();
    let data = generate_report_data(db, date, interval_ms, Utc::now())?;
    let text = format_report(&data, &Local);

    if json {
        writeln!(writer, "{}", format_report_json(&data)?)?;
    } else {
        write!(writer, "{text}")?;
    }

    if save {
        let path = saved_report_path(config, date);
        std::fs::write(&path, &text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        if !json {
            writeln!(writer)?;
            writeln!(writer, "Saved to {}", path.display())?;
        }
        tracing::debug!(path = %path.display(), "report saved");
    }

    Ok(())
}
