//! Config command for showing where settings come from and what is in effect.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::Config;

/// Runs the config command.
///
/// `file` is the config file that would be read, if one could be determined.
pub fn run<W: Write>(writer: &mut W, config: &Config, file: Option<&Path>) -> Result<()> {
    match file {
        Some(path) if path.exists() => writeln!(writer, "Config file: {}", path.display())?,
        Some(path) => writeln!(
            writer,
            "Config file: {} (not found, using defaults; run 'atrack init' to create it)",
            path.display()
        )?,
        None => writeln!(writer, "Config file: (no config directory on this platform)")?,
    }
    writeln!(writer, "Environment overrides: ATRACK_*")?;

    match config.tracker_settings().validate() {
        Ok(()) => writeln!(writer, "Settings: valid")?,
        Err(err) => writeln!(writer, "Settings: INVALID ({err})")?,
    }

    writeln!(writer)?;
    let rendered = config.to_toml().context("failed to render configuration")?;
    write!(writer, "{rendered}")?;
    Ok(())
}
