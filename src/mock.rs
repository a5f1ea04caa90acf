//! Random log line generator for local testing.
//!
//! ```text
//! 2026-10-16 12:00:01 [WARNING] mock.broker: BEGIN pink admin email
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::core::Cancellation;

const LEVELS: &[&str] = &["INFO", "WARNING", "ERROR"];
const APPS: &[&str] = &["worker", "broker", "manager"];
const COMMANDS: &[&str] = &["PROGRESS", "BEGIN", "END"];
const COLORS: &[&str] = &["blue", "red", "green", "black", "yellow", "pink", "white"];
const ROLES: &[&str] = &["user", "admin", "operator"];
const OBJECTS: &[&str] = &["request", "response", "email", "exception"];

/// Sleep granularity while waiting out an interval.
const CANCEL_TICK: Duration = Duration::from_millis(50);

fn pick<R: Rng + ?Sized>(rng: &mut R, words: &'static [&'static str]) -> &'static str {
    words.choose(rng).copied().unwrap_or_default()
}

/// One random line, timestamped with the local time.
pub fn random_log_message() -> String {
    let mut rng = rand::rng();
    format!(
        "{} [{}] mock.{}: {} {} {} {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        pick(&mut rng, LEVELS),
        pick(&mut rng, APPS),
        pick(&mut rng, COMMANDS),
        pick(&mut rng, COLORS),
        pick(&mut rng, ROLES),
        pick(&mut rng, OBJECTS),
    )
}

/// Append a random line to a random file every `interval` until cancelled.
///
/// At least one line is written even when `cancel` is already set.
pub fn write_logfiles(files: &[PathBuf], interval: Duration, cancel: &Cancellation) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("no log files given");
    }

    let mut rng = rand::rng();
    loop {
        let target = &files[rng.random_range(0..files.len())];
        append_line(target, &random_log_message())?;

        if cancel.is_cancelled() || !sleep_unless_cancelled(interval, cancel) {
            return Ok(());
        }
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("failed to write {}", path.display()))
}

/// Returns `false` if cancelled before `duration` elapsed.
fn sleep_unless_cancelled(duration: Duration, cancel: &Cancellation) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(CANCEL_TICK.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let line = random_log_message();
        let parts: Vec<&str> = line.split(' ').collect();
        assert_eq!(parts.len(), 8, "{line}");

        assert!(chrono::NaiveDate::parse_from_str(parts[0], "%Y-%m-%d").is_ok());
        assert!(chrono::NaiveTime::parse_from_str(parts[1], "%H:%M:%S").is_ok());

        let level = parts[2].trim_start_matches('[').trim_end_matches(']');
        assert!(LEVELS.contains(&level), "{line}");

        let app = parts[3]
            .strip_prefix("mock.")
            .and_then(|a| a.strip_suffix(':'))
            .unwrap();
        assert!(APPS.contains(&app), "{line}");

        assert!(COMMANDS.contains(&parts[4]));
        assert!(COLORS.contains(&parts[5]));
        assert!(ROLES.contains(&parts[6]));
        assert!(OBJECTS.contains(&parts[7]));
    }

    #[test]
    fn test_requires_files() {
        assert!(write_logfiles(&[], Duration::ZERO, &Cancellation::new()).is_err());
    }

    #[test]
    fn test_cancelled_writes_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.log");
        let cancel = Cancellation::new();
        cancel.cancel();

        write_logfiles(std::slice::from_ref(&file), Duration::from_secs(10), &cancel).unwrap();

        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_spreads_over_files_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![dir.path().join("a.log"), dir.path().join("b.log")];
        let cancel = Cancellation::new();

        let writer = {
            let files = files.clone();
            let cancel = cancel.clone();
            thread::spawn(move || write_logfiles(&files, Duration::from_millis(1), &cancel))
        };
        thread::sleep(Duration::from_millis(300));
        cancel.cancel();
        writer.join().unwrap().unwrap();

        let total: usize = files
            .iter()
            .filter_map(|f| std::fs::read_to_string(f).ok())
            .map(|c| c.lines().count())
            .sum();
        assert!(total > 2, "{total}");
    }

    #[test]
    fn test_unwritable_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing").join("a.log");
        let cancel = Cancellation::new();
        cancel.cancel();
        assert!(write_logfiles(&[file], Duration::ZERO, &cancel).is_err());
    }
}
