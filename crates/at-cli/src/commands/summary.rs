//! Summary command covering every recorded day.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use at_core::{DayTotal, Session, UsageEntry, UsageSummary};
use at_db::Database;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use super::report::{format_duration, progress_bar, write_heading, write_usage_table};
use crate::Config;

/// Number of applications listed in the summary.
const TOP_APPS: usize = 15;

/// File name of the saved summary.
const SAVED_SUMMARY: &str = "complete_summary.txt";

/// Computed summary data.
#[derive(Debug)]
pub struct SummaryData {
    pub generated_at: DateTime<Utc>,
    pub timezone: String,
    /// First and last recorded day.
    pub range: Option<(NaiveDate, NaiveDate)>,
    pub usage: UsageSummary,
}

impl SummaryData {
    /// Average tracked time per recorded day.
    pub fn daily_average_ms(&self) -> i64 {
        let days = i64::try_from(self.usage.by_day.len()).unwrap_or(i64::MAX);
        if days == 0 {
            return 0;
        }
        self.usage.total_ms / days
    }
}

/// Builds summary data from already-loaded sessions.
pub fn build_summary_data<Tz: TimeZone>(
    sessions: &[Session],
    range: Option<(NaiveDate, NaiveDate)>,
    interval_ms: i64,
    tz: &Tz,
    generated_at: DateTime<Utc>,
) -> SummaryData {
    SummaryData {
        generated_at,
        timezone: iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string()),
        range,
        usage: UsageSummary::from_sessions(sessions, interval_ms, tz),
    }
}

/// Generates summary data from the database.
pub fn generate_summary_data(
    db: &Database,
    interval_ms: i64,
    generated_at: DateTime<Utc>,
) -> Result<SummaryData> {
    let range = db.recorded_days().context("failed to read recorded days")?;
    let sessions = match range {
        Some((first, last)) => db
            .load_range(first, last)
            .context("failed to load recorded sessions")?,
        None => Vec::new(),
    };
    Ok(build_summary_data(
        &sessions,
        range,
        interval_ms,
        &Local,
        generated_at,
    ))
}

/// Formats the human-readable summary output.
pub fn format_summary(data: &SummaryData) -> String {
    let mut output = String::new();

    let Some((first, last)) = data.range.filter(|_| !data.usage.is_empty()) else {
        let _ = writeln!(output, "ACTIVITY SUMMARY");
        let _ = writeln!(output);
        let _ = writeln!(output, "No activity recorded yet.");
        let _ = writeln!(output);
        let _ = writeln!(output, "Hint: Run 'atrack track' to start tracking.");
        return output;
    };

    let _ = writeln!(
        output,
        "ACTIVITY SUMMARY: {} to {}",
        first.format("%b %-d, %Y"),
        last.format("%b %-d, %Y")
    );

    write_heading(&mut output, "BY DAY");
    let busiest = data
        .usage
        .by_day
        .iter()
        .map(|day| day.tracked_ms)
        .max()
        .unwrap_or_default();
    for day in &data.usage.by_day {
        let _ = writeln!(
            output,
            "{:<24}{:>8}  {}",
            day.date.format("%a %b %-d, %Y").to_string(),
            format_duration(day.tracked_ms),
            progress_bar(day.tracked_ms, busiest)
        );
    }

    write_heading(&mut output, "BY CATEGORY");
    write_usage_table(&mut output, &data.usage.by_category, &data.usage, true);

    write_heading(&mut output, "TOP APPLICATIONS");
    write_usage_table(&mut output, data.usage.top_apps(TOP_APPS), &data.usage, false);

    write_heading(&mut output, "SUMMARY");
    let _ = writeln!(output, "Total tracked:  {}", format_duration(data.usage.total_ms));
    let _ = writeln!(output, "Days recorded:  {}", data.usage.by_day.len());
    let _ = writeln!(output, "Daily average:  {}", format_duration(data.daily_average_ms()));
    let _ = writeln!(output, "Sessions:       {}", data.usage.session_count);

    output
}

/// JSON summary structure.
#[derive(Debug, Serialize)]
pub struct JsonSummary<'a> {
    pub generated_at: String,
    pub timezone: &'a str,
    pub first_day: Option<String>,
    pub last_day: Option<String>,
    pub total_ms: i64,
    pub daily_average_ms: i64,
    pub session_count: usize,
    pub by_day: &'a [DayTotal],
    pub by_category: &'a [UsageEntry],
    pub top_apps: &'a [UsageEntry],
}

/// Formats summary data as JSON.
pub fn format_summary_json(data: &SummaryData) -> Result<String> {
    let summary = JsonSummary {
        generated_at: data.generated_at.to_rfc3339(),
        timezone: &data.timezone,
        first_day: data.range.map(|(first, _)| first.to_string()),
        last_day: data.range.map(|(_, last)| last.to_string()),
        total_ms: data.usage.total_ms,
        daily_average_ms: data.daily_average_ms(),
        session_count: data.usage.session_count,
        by_day: &data.usage.by_day,
        by_category: &data.usage.by_category,
        top_apps: data.usage.top_apps(TOP_APPS),
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}

/// Path of the saved text summary.
pub fn saved_summary_path(config: &Config) -> PathBuf {
    config.data_dir().join(SAVED_SUMMARY)
}

/// Runs the summary command.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    json: bool,
    save: bool,
) -> Result<()> {
    let interval_ms = config.tracker_settings().sampling_interval_ms();
    let data = generate_summary_data(db, interval_ms, Utc::now())?;
    let text = format_summary(&data);

    if json {
        writeln!(writer, "{}", format_summary_json(&data)?)?;
    } else {
        write!(writer, "{text}")?;
    }

    if save {
        let path = saved_summary_path(config);
        std::fs::write(&path, &text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        if !json {
            writeln!(writer)?;
            writeln!(writer, "Saved to {}", path.display())?;
        }
    }

    Ok(())
}
