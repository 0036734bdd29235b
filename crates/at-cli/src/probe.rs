//! Foreground-window probe backed by platform helper commands.
//!
//! - Linux (X11): `xdotool` for the active window, `/proc/<pid>/comm` for the
//!   process name, `xprintidle` for input idle time. Without `xprintidle`, input
//!   is inferred: a moved pointer or a changed window title counts as activity.
//! - macOS: `osascript` (System Events) for the frontmost app and window,
//!   `ioreg` `HIDIdleTime` for input idle time.
//!
//! Every helper runs with `kill_on_drop`, so a call abandoned by the tracker's
//! timeout does not leave a process behind.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use at_core::{Observation, ProbeError, WindowProbe};
use chrono::{DateTime, Duration, Utc};
use tokio::process::Command;

const MACOS_FRONT_WINDOW_SCRIPT: &str = r#"
tell application "System Events"
    set frontApp to name of first application process whose frontmost is true
    set windowTitle to ""
    tell process frontApp
        if exists (1st window whose value of attribute "AXMain" is true) then
            set windowTitle to name of 1st window whose value of attribute "AXMain" is true
        end if
    end tell
    return frontApp & linefeed & windowTitle
end tell
"#;

/// How the Linux probe learns about user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputSource {
    /// Not determined yet.
    Unknown,
    Xprintidle,
    /// Pointer and title changes.
    Inferred,
}

/// Probe for the machine the tracker runs on.
#[derive(Debug)]
pub struct SystemProbe {
    os: &'static str,
    /// Directory to run helpers from instead of searching `PATH`.
    helper_dir: Option<PathBuf>,
    input_source: InputSource,
    /// Title seen by the latest `sample`.
    title: Option<String>,
    /// Title and pointer position at the latest inferred input check.
    seen_title: Option<String>,
    seen_pointer: Option<String>,
    inferred_input: DateTime<Utc>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    fn for_os(os: &'static str) -> Self {
        Self {
            os,
            helper_dir: None,
            input_source: InputSource::Unknown,
            title: None,
            seen_title: None,
            seen_pointer: None,
            inferred_input: Utc::now(),
        }
    }

    /// Resolves a helper program, from `helper_dir` if set, else from `PATH`.
    fn helper(&self, name: &str) -> PathBuf {
        self.helper_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(name), |dir| dir.join(name))
    }

    async fn sample_linux(&mut self) -> Result<Observation, ProbeError> {
        let xdotool = self.helper("xdotool");
        let window = run(&xdotool, &["getactivewindow"]).await?;
        if window.is_empty() {
            return Err(ProbeError::NoWindow);
        }
        let pid = run(&xdotool, &["getwindowpid", &window]).await?;
        let pid: u32 = pid
            .parse()
            .map_err(|_| ProbeError::Malformed(format!("window pid `{pid}`")))?;
        let title = match run(&xdotool, &["getwindowname", &window]).await {
            Ok(title) => title,
            Err(err) => {
                tracing::debug!(%err, %window, "window title unavailable");
                String::new()
            }
        };
        let comm = format!("/proc/{pid}/comm");
        let app = tokio::fs::read_to_string(&comm)
            .await
            .map_err(|err| ProbeError::Command {
                command: format!("read {comm}"),
                message: err.to_string(),
            })?;

        self.title = Some(title.clone());
        Ok(Observation::new(app.trim(), title, Utc::now()))
    }

    async fn sample_macos(&mut self) -> Result<Observation, ProbeError> {
        let output = run(&self.helper("osascript"), &["-e", MACOS_FRONT_WINDOW_SCRIPT]).await?;
        let (app, title) = parse_front_window(&output)?;
        self.title = Some(title.to_string());
        Ok(Observation::new(app, title, Utc::now()))
    }

    async fn last_input_linux(&mut self) -> Result<DateTime<Utc>, ProbeError> {
        if self.input_source != InputSource::Inferred {
            match run(&self.helper("xprintidle"), &[]).await {
                Ok(output) => {
                    self.input_source = InputSource::Xprintidle;
                    let idle_ms = parse_xprintidle(&output)?;
                    return input_before(Utc::now(), Duration::try_milliseconds(idle_ms), &output);
                }
                Err(err) if self.input_source == InputSource::Unknown => {
                    tracing::info!(%err, "xprintidle unavailable; inferring input from pointer and title changes");
                    self.input_source = InputSource::Inferred;
                }
                Err(err) => return Err(err),
            }
        }

        let pointer = run(&self.helper("xdotool"), &["getmouselocation"]).await?;
        let pointer = parse_pointer_position(&pointer)?;
        let now = Utc::now();
        if self.seen_pointer.as_deref() != Some(pointer.as_str()) || self.seen_title != self.title {
            self.inferred_input = now;
        }
        self.seen_pointer = Some(pointer);
        self.seen_title.clone_from(&self.title);
        Ok(self.inferred_input)
    }

    async fn last_input_macos(&mut self) -> Result<DateTime<Utc>, ProbeError> {
        let output = run(&self.helper("ioreg"), &["-c", "IOHIDSystem", "-d", "4"]).await?;
        let idle_ns = parse_hid_idle_time(&output)?;
        input_before(Utc::now(), Some(Duration::nanoseconds(idle_ns)), &output)
    }
}

impl WindowProbe for SystemProbe {
    async fn sample(&mut self) -> Result<Observation, ProbeError> {
        match self.os {
            "linux" => self.sample_linux().await,
            "macos" => self.sample_macos().await,
            other => Err(ProbeError::Unsupported(other)),
        }
    }

    async fn last_input_time(&mut self) -> Result<DateTime<Utc>, ProbeError> {
        match self.os {
            "linux" => self.last_input_linux().await,
            "macos" => self.last_input_macos().await,
            other => Err(ProbeError::Unsupported(other)),
        }
    }
}

/// The last input time, `idle` before `now`. `raw` is the helper output the
/// idle time was read from.
fn input_before(
    now: DateTime<Utc>,
    idle: Option<Duration>,
    raw: &str,
) -> Result<DateTime<Utc>, ProbeError> {
    idle.filter(|idle| *idle >= Duration::zero())
        .and_then(|idle| now.checked_sub_signed(idle))
        .ok_or_else(|| ProbeError::Malformed(format!("idle time `{}` out of range", raw.trim())))
}

/// Runs a helper command and returns its trimmed stdout.
async fn run(program: &Path, args: &[&str]) -> Result<String, ProbeError> {
    let name = program.display().to_string();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| ProbeError::Command {
            command: name.clone(),
            message: err.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::Command {
            command: name,
            message: if stderr.trim().is_empty() {
                output.status.to_string()
            } else {
                stderr.trim().to_string()
            },
        });
    }

    String::from_utf8(output.stdout)
        .map(|stdout| stdout.trim().to_string())
        .map_err(|_| ProbeError::Malformed(format!("{name} printed non-UTF-8 output")))
}

/// Splits the `app\ntitle` answer of the `osascript` query.
fn parse_front_window(output: &str) -> Result<(&str, &str), ProbeError> {
    let mut lines = output.lines();
    let app = lines.next().map(str::trim).unwrap_or_default();
    if app.is_empty() {
        return Err(ProbeError::NoWindow);
    }
    let title = lines.next().map(str::trim).unwrap_or_default();
    Ok((app, title))
}

fn parse_xprintidle(output: &str) -> Result<i64, ProbeError> {
    output
        .trim()
        .parse()
        .map_err(|_| ProbeError::Malformed(format!("xprintidle output `{output}`")))
}

/// Extracts `x:.. y:..` from `xdotool getmouselocation` output.
fn parse_pointer_position(output: &str) -> Result<String, ProbeError> {
    let position: Vec<_> = output
        .split_whitespace()
        .filter(|field| field.starts_with("x:") || field.starts_with("y:"))
        .collect();
    if position.len() == 2 {
        Ok(position.join(" "))
    } else {
        Err(ProbeError::Malformed(format!("pointer location `{output}`")))
    }
}

/// Reads `"HIDIdleTime" = <ns>` from `ioreg` output.
fn parse_hid_idle_time(output: &str) -> Result<i64, ProbeError> {
    output
        .lines()
        .find(|line| line.contains("\"HIDIdleTime\""))
        .and_then(|line| line.rsplit('=').next())
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| ProbeError::Malformed("HIDIdleTime missing from ioreg output".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_window_with_title() {
        assert_eq!(
            parse_front_window("Safari\nRust Book - Chapter 4\n").unwrap(),
            ("Safari", "Rust Book - Chapter 4")
        );
    }

    #[test]
    fn front_window_without_title() {
        assert_eq!(parse_front_window("Finder").unwrap(), ("Finder", ""));
        assert_eq!(parse_front_window(""), Err(ProbeError::NoWindow));
    }

    #[test]
    fn xprintidle_milliseconds() {
        assert_eq!(parse_xprintidle("15230\n").unwrap(), 15_230);
        assert!(matches!(parse_xprintidle("n/a"), Err(ProbeError::Malformed(_))));
    }

    #[test]
    fn pointer_position_ignores_window_field() {
        assert_eq!(
            parse_pointer_position("x:812 y:433 screen:0 window:65011719").unwrap(),
            "x:812 y:433"
        );
        assert!(parse_pointer_position("garbage").is_err());
    }

    #[test]
    fn hid_idle_time_from_ioreg() {
        let output = r#"
    | |   "HIDIdleTimeDelta" = 12
    | |   "HIDIdleTime" = 4815162342
    | |   "HIDKeyboardModifierMappingPairs" = ()
"#;
        assert_eq!(parse_hid_idle_time(output).unwrap(), 4_815_162_342);
        assert!(parse_hid_idle_time("nothing here").is_err());
    }

    #[tokio::test]
    async fn unsupported_platform_is_a_probe_error() {
        let mut probe = SystemProbe::for_os("plan9");
        assert_eq!(
            probe.sample().await,
            Err(ProbeError::Unsupported("plan9"))
        );
        assert_eq!(
            probe.last_input_time().await,
            Err(ProbeError::Unsupported("plan9"))
        );
    }

    #[test]
    fn input_before_rejects_unrepresentable_idle_times() {
        let now = Utc::now();
        assert_eq!(
            input_before(now, Some(Duration::seconds(90)), "90000"),
            Ok(now - Duration::seconds(90))
        );
        assert!(matches!(
            input_before(now, Some(Duration::seconds(-1)), "-1000"),
            Err(ProbeError::Malformed(_))
        ));
        assert!(matches!(
            input_before(now, None, "9223372036854775807"),
            Err(ProbeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_helper_is_a_command_error() {
        let err = run(Path::new("atrack-no-such-helper"), &[]).await.unwrap_err();
        assert!(matches!(err, ProbeError::Command { command, .. } if command == "atrack-no-such-helper"));
    }

    #[cfg(unix)]
    mod helpers {
        use std::os::unix::fs::PermissionsExt;

        use super::*;

        /// Writes an executable shell script `name` into `dir`.
        fn script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        /// `xdotool` answering from `title` and `pointer` files in `dir`. The
        /// window belongs to the test process, so `/proc/<pid>/comm` exists.
        fn fake_xdotool(dir: &Path) {
            let dir_str = dir.display();
            let pid = std::process::id();
            script(
                dir,
                "xdotool",
                &format!(
                    r#"case "$1" in
  getactivewindow) echo 4242 ;;
  getwindowpid) echo {pid} ;;
  getwindowname) cat "{dir_str}/title" ;;
  getmouselocation) cat "{dir_str}/pointer" ;;
  *) exit 1 ;;
esac"#
                ),
            );
        }

        fn linux_probe(dir: &Path) -> SystemProbe {
            SystemProbe {
                helper_dir: Some(dir.to_path_buf()),
                ..SystemProbe::for_os("linux")
            }
        }

        async fn pause() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        #[tokio::test]
        async fn xprintidle_reports_input_time() {
            let temp = tempfile::tempdir().unwrap();
            script(temp.path(), "xprintidle", "echo 1500");
            let mut probe = linux_probe(temp.path());

            let before = Utc::now();
            let last_input = probe.last_input_time().await.unwrap();
            let after = Utc::now();

            assert_eq!(probe.input_source, InputSource::Xprintidle);
            assert!(last_input >= before - Duration::milliseconds(1500));
            assert!(last_input <= after - Duration::milliseconds(1500));
        }

        #[tokio::test]
        async fn out_of_range_xprintidle_output_is_malformed() {
            let temp = tempfile::tempdir().unwrap();
            let mut probe = linux_probe(temp.path());

            for output in ["9223372036854775807", "-9223372036854775808", "-5"] {
                script(temp.path(), "xprintidle", &format!("echo {output}"));
                assert!(
                    matches!(probe.last_input_time().await, Err(ProbeError::Malformed(_))),
                    "xprintidle printed {output}"
                );
            }
        }

        #[tokio::test]
        async fn missing_xprintidle_falls_back_to_pointer_and_title_for_good() {
            let temp = tempfile::tempdir().unwrap();
            fake_xdotool(temp.path());
            std::fs::write(temp.path().join("title"), "main.rs - vscode").unwrap();
            std::fs::write(temp.path().join("pointer"), "x:10 y:20 screen:0 window:4242").unwrap();
            let mut probe = linux_probe(temp.path());

            let observation = probe.sample().await.unwrap();
            assert!(!observation.app_id.is_empty());
            assert_eq!(observation.window_title, "main.rs - vscode");

            let first = probe.last_input_time().await.unwrap();
            assert_eq!(probe.input_source, InputSource::Inferred);

            // Installed later, but the probe has already switched over.
            script(temp.path(), "xprintidle", "echo 0");
            pause().await;
            assert_eq!(probe.last_input_time().await.unwrap(), first);

            std::fs::write(temp.path().join("pointer"), "x:11 y:20 screen:0 window:4242").unwrap();
            pause().await;
            let moved = probe.last_input_time().await.unwrap();
            assert!(moved > first);

            std::fs::write(temp.path().join("title"), "lib.rs - vscode").unwrap();
            probe.sample().await.unwrap();
            pause().await;
            let retitled = probe.last_input_time().await.unwrap();
            assert!(retitled > moved);

            pause().await;
            assert_eq!(probe.last_input_time().await.unwrap(), retitled);
            assert_eq!(probe.input_source, InputSource::Inferred);
        }

        #[tokio::test]
        async fn missing_window_title_leaves_it_empty() {
            let temp = tempfile::tempdir().unwrap();
            fake_xdotool(temp.path());
            let mut probe = linux_probe(temp.path());

            let observation = probe.sample().await.unwrap();
            assert_eq!(observation.window_title, "");
        }
    }
}
