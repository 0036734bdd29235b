//! Init command for writing the default configuration file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::Config;

/// Runs the init command.
pub fn run<W: Write>(writer: &mut W, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        writeln!(writer, "Config already exists: {}", path.display())?;
        writeln!(writer, "Use --force to overwrite it with the defaults.")?;
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    let contents = Config::default()
        .to_toml()
        .context("failed to render default config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;

    writeln!(writer, "Wrote default config to {}", path.display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_default_config_once() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested/config.toml");

        let mut output = Vec::new();
        run(&mut output, &path, false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("sampling_interval_seconds = 30"));
        assert!(written.contains("[[categories]]"));
        assert!(written.contains("name = \"Coding\""));

        std::fs::write(&path, "sampling_interval_seconds = 5\n").unwrap();
        let mut output = Vec::new();
        run(&mut output, &path, false).unwrap();
        assert!(String::from_utf8(output).unwrap().starts_with("Config already exists"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "sampling_interval_seconds = 5\n"
        );

        run(&mut Vec::new(), &path, true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[[categories]]"));
    }
}
