//! Append-only run log.
//!
//! One line per event, `[YYYY-MM-DD HH:MM:SS] [SEVERITY] message`, appended to
//! `services.log`. Entries are also kept in memory for the run report, and
//! mirrored to the `log` facade (FAIL at warn, everything else at info).
//! No rotation.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::error::EngineError;

/// Severity marker written in front of every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Pass,
    Fail,
    Info,
    Skip,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Pass => write!(f, "[PASS]"),
            Severity::Fail => write!(f, "[FAIL]"),
            Severity::Info => write!(f, "[INFO]"),
            Severity::Skip => write!(f, "[SKIP]"),
        }
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub at: NaiveDateTime,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    /// The line as written to the log file (without trailing newline).
    pub fn line(&self) -> String {
        format!(
            "[{}] {} {}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.severity,
            self.message
        )
    }
}

/// Log sink for one run.
#[derive(Debug)]
pub struct RunLog {
    file: Option<File>,
    path: Option<PathBuf>,
    entries: Vec<LogEntry>,
}

impl RunLog {
    /// Open `path` for appending, creating it (and its directory) if needed.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let log_err = |source| EngineError::Log {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(log_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(log_err)?;
        Ok(Self {
            file: Some(file),
            path: Some(path.to_path_buf()),
            entries: Vec::new(),
        })
    }

    /// A log that only keeps entries in memory.
    pub fn in_memory() -> Self {
        Self {
            file: None,
            path: None,
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&mut self, severity: Severity, message: impl Into<String>) {
        let entry = LogEntry {
            at: Local::now().naive_local(),
            severity,
            message: message.into(),
        };
        match severity {
            Severity::Fail => tracing::warn!("{}", entry.message),
            _ => tracing::info!("{} {}", severity, entry.message),
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(err) = writeln!(file, "{}", entry.line()) {
                tracing::warn!("cannot append to run log: {err}");
            }
        }
        self.entries.push(entry);
    }

    pub fn pass(&mut self, message: impl Into<String>) {
        self.record(Severity::Pass, message);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.record(Severity::Fail, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(Severity::Info, message);
    }

    pub fn skip(&mut self, message: impl Into<String>) {
        self.record(Severity::Skip, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries recorded with `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|e| e.severity == severity).count()
    }

    /// `true` if some entry with `severity` mentions `needle`.
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.severity == severity && e.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lines_are_timestamped_and_tagged() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("services.log");
        let mut log = RunLog::open(&path).expect("open");
        log.pass("Loaded configuration");
        log.fail("Failed to connect to portal");
        drop(log);

        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] [PASS] Loaded configuration"));
        assert!(lines[1].ends_with("] [FAIL] Failed to connect to portal"));
        // "[YYYY-MM-DD HH:MM:SS]" prefix
        assert_eq!(&lines[0][20..22], "] ");
    }

    #[test]
    fn reopening_appends() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("services.log");
        RunLog::open(&path).expect("open").info("first run");
        RunLog::open(&path).expect("reopen").info("second run");

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("first run") && text.contains("second run"));
    }

    #[test]
    fn in_memory_counts_by_severity() {
        let mut log = RunLog::in_memory();
        log.skip("a");
        log.skip("b");
        log.info("c");
        assert_eq!(log.count(Severity::Skip), 2);
        assert!(log.contains(Severity::Info, "c"));
        assert!(!log.contains(Severity::Fail, "c"));
        assert!(log.path().is_none());
    }
}
