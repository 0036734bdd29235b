//! Status command for showing what has been recorded so far.

use std::io::Write;

use anyhow::{Context, Result};
use at_db::Database;
use chrono::Local;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, db: &Database, config: &Config) -> Result<()> {
    writeln!(writer, "Activity tracker status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;

    let Some((first, last)) = db.recorded_days().context("failed to read recorded days")? else {
        writeln!(writer, "No sessions recorded.")?;
        return Ok(());
    };

    let days = db.day_count().context("failed to count recorded days")?;
    writeln!(writer, "Days recorded: {days} ({first} to {last})")?;

    if let Some((day, session)) = db.last_session().context("failed to read last session")? {
        writeln!(
            writer,
            "Last session: {day} {}-{} {} / {} ({} samples)",
            session.start.with_timezone(&Local).format("%H:%M"),
            session.end.with_timezone(&Local).format("%H:%M"),
            session.category,
            session.app_id,
            session.sample_count
        )?;
    }

    Ok(())
}
