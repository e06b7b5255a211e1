//! Watcher activity log
//!
//! Append-only JSONL, one entry per line:
//!
//! ```text
//! {"timestamp":"2025-01-02T03:04:05Z","level":"success","message":"Processed checkpoint","context":{"file":"a.json"}}
//! ```
//!
//! Entries are mirrored to `tracing` so they also reach the diagnostic log.
//! Writing is best-effort: a failed append is reported through `tracing`
//! and never interrupts the daemon.

use crate::storage::FileManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Severity of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    /// An item finished and its artifacts were verified
    Success,
    Warning,
    Error,
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Append-only JSONL activity writer.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
    files: FileManager,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files: FileManager::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, level: LogLevel, message: impl Into<String>, context: Option<Value>) {
        let entry = ActivityEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            context,
        };

        let context = entry
            .context
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        match level {
            LogLevel::Debug => tracing::debug!(context = %context, "{}", entry.message),
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(context = %context, "{}", entry.message)
            }
            LogLevel::Warning => tracing::warn!(context = %context, "{}", entry.message),
            LogLevel::Error => tracing::error!(context = %context, "{}", entry.message),
        }

        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize activity entry");
                return;
            }
        };
        if let Err(e) = self.files.append_line(&self.path, &line) {
            tracing::warn!(error = %e, "Failed to append activity entry");
        }
    }

    pub fn debug(&self, message: impl Into<String>, context: Option<Value>) {
        self.record(LogLevel::Debug, message, context);
    }

    pub fn info(&self, message: impl Into<String>, context: Option<Value>) {
        self.record(LogLevel::Info, message, context);
    }

    pub fn success(&self, message: impl Into<String>, context: Option<Value>) {
        self.record(LogLevel::Success, message, context);
    }

    pub fn warning(&self, message: impl Into<String>, context: Option<Value>) {
        self.record(LogLevel::Warning, message, context);
    }

    pub fn error(&self, message: impl Into<String>, context: Option<Value>) {
        self.record(LogLevel::Error, message, context);
    }

    /// Read back all entries. Malformed lines are skipped.
    pub fn read_entries(&self) -> crate::error::Result<Vec<ActivityEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = self.files.read(&self.path)?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_entries_are_jsonl() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("logs/activity.jsonl"));
        log.info("Watcher started", None);
        log.success("Processed checkpoint", Some(json!({"file": "a.json"})));

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].contains("context"));
        assert!(lines[1].contains(r#""level":"success""#));

        let entries = log.read_entries().unwrap();
        assert_eq!(entries[1].level, LogLevel::Success);
        assert_eq!(entries[1].context, Some(json!({"file": "a.json"})));
    }

    #[test]
    fn test_unwritable_log_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let log = ActivityLog::new(blocker.join("activity.jsonl"));
        log.error("still fine", None);
        assert!(log.read_entries().unwrap().is_empty());
    }
}
