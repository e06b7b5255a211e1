//! Watcher daemon
//!
//! Single-threaded cooperative polling over a watch directory:
//!
//! ```text
//! <watch_dir>/
//! ├── *.json                  # checkpoint files, processed in name order
//! ├── cache/<platform>/...    # cache chunks, see crate::consolidate
//! ├── .archive/               # processed checkpoints (archive mode)
//! └── .watcher-state.json     # PID/state file while the daemon runs
//! ```
//!
//! ## Lifecycle
//!
//! `Stopped → Starting → Running → Stopping → Stopped`. Item failures are
//! caught per checkpoint, counted and logged; the loop keeps going. A
//! shutdown request stops new work, lets the in-flight item finish and
//! removes the state file.
//!
//! All mutable daemon state lives in one [`WatcherRuntimeState`] owned by the
//! [`Watcher`], so the poll loop can be driven directly in tests.

pub mod activity;

use crate::config::{RenderConfig, WatcherConfig};
use crate::consolidate::{CacheConsolidationAgent, ChunkDisposal};
use crate::error::{Error, Result};
use crate::pipeline::MemoryPipeline;
use crate::storage::{FileManager, WriteOptions};
use crate::types::WatcherRuntimeState;
use activity::ActivityLog;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

/// Chunk cache, relative to the watch directory.
pub const CACHE_SUBDIR: &str = "cache";
/// Processed checkpoints in archive mode, relative to the watch directory.
pub const ARCHIVE_SUBDIR: &str = ".archive";
/// PID/state file name inside the watch directory.
pub const STATE_FILE: &str = ".watcher-state.json";

/// Longest uninterrupted sleep while waiting for the next poll.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Daemon lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Everything the watcher needs to run.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub watch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub poll_interval: Duration,
    pub disposal: ChunkDisposal,
    /// JSONL activity log location
    pub activity_log: PathBuf,
    pub render: RenderConfig,
}

impl WatcherOptions {
    /// Options from configuration, with explicit directories.
    pub fn from_config(
        config: &WatcherConfig,
        render: &RenderConfig,
        watch_dir: PathBuf,
        output_dir: PathBuf,
        activity_log: PathBuf,
    ) -> Self {
        Self {
            watch_dir,
            output_dir,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            disposal: if config.archive_processed {
                ChunkDisposal::Archive
            } else {
                ChunkDisposal::Delete
            },
            activity_log,
            render: render.clone(),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.watch_dir.join(STATE_FILE)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.watch_dir.join(CACHE_SUBDIR)
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub checkpoints_processed: usize,
    pub checkpoints_failed: usize,
    /// Checkpoints left alone because they failed before and are unchanged
    pub checkpoints_skipped: usize,
    pub conversations_consolidated: usize,
    pub consolidation_errors: usize,
}

/// The watcher daemon.
pub struct Watcher {
    options: WatcherOptions,
    state: WatcherRuntimeState,
    daemon_state: DaemonState,
    pipeline: MemoryPipeline,
    consolidator: CacheConsolidationAgent,
    files: FileManager,
    activity: ActivityLog,
    /// Checkpoints that failed permanently, with the mtime they failed at
    rejected: HashMap<PathBuf, SystemTime>,
}

impl Watcher {
    pub fn new(options: WatcherOptions) -> Self {
        Self::with_state(options, WatcherRuntimeState::for_current_process())
    }

    /// Build a watcher around an existing runtime state.
    pub fn with_state(options: WatcherOptions, state: WatcherRuntimeState) -> Self {
        let pipeline = MemoryPipeline::new(&options.output_dir, &options.render);
        let consolidator = CacheConsolidationAgent::new(options.cache_dir(), options.disposal);
        let activity = ActivityLog::new(&options.activity_log);
        Self {
            options,
            state,
            daemon_state: DaemonState::Stopped,
            pipeline,
            consolidator,
            files: FileManager::new(),
            activity,
            rejected: HashMap::new(),
        }
    }

    pub fn state(&self) -> &WatcherRuntimeState {
        &self.state
    }

    pub fn daemon_state(&self) -> DaemonState {
        self.daemon_state
    }

    pub fn options(&self) -> &WatcherOptions {
        &self.options
    }

    /// Poll until `running` is cleared, then shut down cleanly.
    pub fn run(&mut self, running: &AtomicBool) -> Result<WatcherRuntimeState> {
        self.start()?;
        while running.load(Ordering::SeqCst) {
            self.poll_once(running);
            self.sleep(running);
        }
        self.stop()
    }

    /// Prepare directories and publish the state file.
    pub fn start(&mut self) -> Result<()> {
        self.daemon_state = DaemonState::Starting;
        self.files.ensure_dir(&self.options.watch_dir)?;
        self.files.ensure_dir(&self.options.output_dir)?;
        self.write_state()?;
        self.daemon_state = DaemonState::Running;

        self.activity.info(
            "Watcher started",
            Some(json!({
                "pid": self.state.pid,
                "watchDir": self.options.watch_dir.display().to_string(),
                "outputDir": self.options.output_dir.display().to_string(),
                "pollIntervalMs": self.options.poll_interval.as_millis() as u64,
            })),
        );
        Ok(())
    }

    /// Remove the state file and report final counters.
    pub fn stop(&mut self) -> Result<WatcherRuntimeState> {
        self.daemon_state = DaemonState::Stopping;
        self.files.remove(&self.options.state_file())?;
        self.activity.info(
            "Watcher stopped",
            Some(json!({
                "processedCount": self.state.processed_count,
                "errorCount": self.state.error_count,
            })),
        );
        self.daemon_state = DaemonState::Stopped;
        Ok(self.state.clone())
    }

    /// Process everything currently pending. Never fails: item errors are
    /// counted and logged.
    pub fn poll_once(&mut self, running: &AtomicBool) -> PollReport {
        let mut report = PollReport::default();

        let checkpoints = match self.pending_checkpoints() {
            Ok(paths) => paths,
            Err(e) => {
                self.record_error("Failed to list checkpoints", &e, None);
                Vec::new()
            }
        };

        for path in checkpoints {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            if self.is_rejected(&path) {
                report.checkpoints_skipped += 1;
                continue;
            }
            match self.process_checkpoint(&path) {
                Ok(()) => report.checkpoints_processed += 1,
                Err(e) => {
                    report.checkpoints_failed += 1;
                    if !is_retryable(&e) {
                        if let Some(mtime) = modified(&path) {
                            self.rejected.insert(path.clone(), mtime);
                        }
                    }
                    self.record_error("Checkpoint failed", &e, Some(&path));
                }
            }
        }

        if running.load(Ordering::SeqCst) && self.consolidator.cache_dir().is_dir() {
            match self.consolidator.consolidate(&self.pipeline) {
                Ok(consolidation) => {
                    report.conversations_consolidated = consolidation.conversations_written;
                    report.consolidation_errors = consolidation.errors.len();
                    self.state.processed_count += consolidation.conversations_written as u64;
                    self.state.error_count += consolidation.errors.len() as u64;
                    for error in &consolidation.errors {
                        self.activity
                            .error("Consolidation failed", Some(json!({ "error": error })));
                    }
                    if consolidation.conversations_written > 0 {
                        self.activity.success(
                            "Consolidated cache chunks",
                            Some(json!({
                                "conversations": consolidation.conversations_written,
                                "chunks": consolidation.chunks_released,
                                "messages": consolidation.messages_merged,
                            })),
                        );
                    }
                }
                Err(e) => {
                    report.consolidation_errors += 1;
                    self.record_error("Consolidation pass failed", &e, None);
                }
            }
            self.persist_state();
        }

        report
    }

    fn process_checkpoint(&mut self, path: &Path) -> Result<()> {
        self.activity.debug(
            "Processing checkpoint",
            Some(json!({ "file": path.display().to_string() })),
        );

        let outcome = self.pipeline.process_checkpoint_file(path)?;
        match self.options.disposal {
            ChunkDisposal::Archive => {
                self.files
                    .archive(path, &self.options.watch_dir.join(ARCHIVE_SUBDIR))?;
            }
            ChunkDisposal::Delete => self.files.remove(path)?,
        }

        self.state.processed_count += 1;
        self.persist_state();
        self.activity.success(
            "Processed checkpoint",
            Some(json!({
                "file": path.display().to_string(),
                "conversation": outcome.conversation_id,
                "structured": outcome.structured_path.display().to_string(),
                "narrative": outcome.narrative_path.display().to_string(),
                "warnings": outcome.warnings.len(),
            })),
        );
        if !outcome.warnings.is_empty() {
            self.activity.warning(
                "Memory files have validation warnings",
                Some(json!({
                    "conversation": outcome.conversation_id,
                    "warnings": outcome.warnings,
                })),
            );
        }
        Ok(())
    }

    /// Top-level `*.json` files in the watch directory, sorted by name.
    pub fn pending_checkpoints(&self) -> Result<Vec<PathBuf>> {
        let root = glob::Pattern::escape(&self.options.watch_dir.to_string_lossy());
        let pattern = format!("{root}/*.json");
        let entries =
            glob::glob(&pattern).map_err(|e| Error::file_op(&self.options.watch_dir, e))?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| !n.starts_with('.'))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn is_rejected(&mut self, path: &Path) -> bool {
        match (self.rejected.get(path), modified(path)) {
            (Some(failed_at), Some(now)) if *failed_at == now => true,
            (Some(_), _) => {
                self.rejected.remove(path);
                false
            }
            _ => false,
        }
    }

    fn record_error(&mut self, message: &str, error: &Error, path: Option<&Path>) {
        self.state.error_count += 1;
        self.persist_state();
        self.activity.error(
            message,
            Some(json!({
                "file": path.map(|p| p.display().to_string()),
                "error": error.to_string(),
            })),
        );
    }

    fn write_state(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        self.files
            .write(&self.options.state_file(), &json, WriteOptions::default())?;
        Ok(())
    }

    /// State-file refresh inside the loop; failures are logged, not fatal.
    fn persist_state(&self) {
        if let Err(e) = self.write_state() {
            tracing::warn!(error = %e, "Failed to update watcher state file");
        }
    }

    fn sleep(&self, running: &AtomicBool) {
        let mut remaining = self.options.poll_interval;
        while !remaining.is_zero() && running.load(Ordering::SeqCst) {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

/// Errors worth retrying on the next cycle without a change to the input.
fn is_retryable(error: &Error) -> bool {
    matches!(
        error,
        Error::FileOperation { .. } | Error::Io(_) | Error::Validation { .. }
    )
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read a state file written by a running watcher.
pub fn read_state_file(path: &Path) -> Result<Option<WatcherRuntimeState>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = FileManager::new().read(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    const CHECKPOINT: &str = r#"{
        "conversation": {
            "id": "conv-w",
            "messages": [
                {"role": "user", "content": "How do I implement a parser?"},
                {"role": "assistant", "content": "Here is how you implement a parser with TypeScript."}
            ]
        },
        "source": "generic"
    }"#;

    fn injected_state() -> WatcherRuntimeState {
        WatcherRuntimeState {
            pid: 4242,
            started_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            processed_count: 0,
            error_count: 0,
        }
    }

    fn watcher(dir: &TempDir, disposal: ChunkDisposal) -> Watcher {
        let options = WatcherOptions {
            watch_dir: dir.path().join("watch"),
            output_dir: dir.path().join("out"),
            poll_interval: Duration::from_millis(10),
            disposal,
            activity_log: dir.path().join("activity.jsonl"),
            render: RenderConfig::default(),
        };
        Watcher::with_state(options, injected_state())
    }

    #[test]
    fn test_lifecycle_writes_and_removes_state_file() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Delete);
        assert_eq!(w.daemon_state(), DaemonState::Stopped);

        w.start().unwrap();
        assert_eq!(w.daemon_state(), DaemonState::Running);
        let state = read_state_file(&w.options().state_file()).unwrap().unwrap();
        assert_eq!(state.pid, 4242);

        let final_state = w.stop().unwrap();
        assert_eq!(w.daemon_state(), DaemonState::Stopped);
        assert_eq!(final_state.processed_count, 0);
        assert!(!w.options().state_file().exists());
    }

    #[test]
    fn test_poll_processes_and_archives_checkpoints() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Archive);
        w.start().unwrap();
        fs::write(dir.path().join("watch/a.json"), CHECKPOINT).unwrap();

        let running = AtomicBool::new(true);
        let report = w.poll_once(&running);

        assert_eq!(report.checkpoints_processed, 1);
        assert_eq!(w.state().processed_count, 1);
        assert!(dir.path().join("out/.aicf/conv-w.aicf").exists());
        assert!(dir.path().join("out/.ai/conv-w.md").exists());
        assert!(dir.path().join("watch/.archive/a.json").exists());
        assert!(!dir.path().join("watch/a.json").exists());

        let state = read_state_file(&w.options().state_file()).unwrap().unwrap();
        assert_eq!(state.processed_count, 1);
    }

    #[test]
    fn test_bad_checkpoint_is_counted_and_loop_continues() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Delete);
        w.start().unwrap();
        fs::write(dir.path().join("watch/a-bad.json"), "{broken").unwrap();
        fs::write(dir.path().join("watch/b-good.json"), CHECKPOINT).unwrap();

        let running = AtomicBool::new(true);
        let report = w.poll_once(&running);
        assert_eq!(report.checkpoints_failed, 1);
        assert_eq!(report.checkpoints_processed, 1);
        assert_eq!(w.state().error_count, 1);
        assert!(dir.path().join("watch/a-bad.json").exists());

        // Unchanged bad input is not retried
        let report = w.poll_once(&running);
        assert_eq!(report.checkpoints_skipped, 1);
        assert_eq!(w.state().error_count, 1);

        let entries = ActivityLog::new(dir.path().join("activity.jsonl"))
            .read_entries()
            .unwrap();
        assert!(entries
            .iter()
            .any(|e| e.level == activity::LogLevel::Error));
        assert!(entries
            .iter()
            .any(|e| e.level == activity::LogLevel::Success));
    }

    #[test]
    fn test_validator_warnings_become_warning_entries() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Delete);
        w.start().unwrap();
        let checkpoint = json!({
            "conversation": {
                "id": "conv-big",
                "messages": [
                    {"role": "user", "content": "x ".repeat(700_000)},
                    {"role": "assistant", "content": "Done."}
                ]
            },
            "source": "generic"
        });
        fs::write(dir.path().join("watch/big.json"), checkpoint.to_string()).unwrap();

        let running = AtomicBool::new(true);
        assert_eq!(w.poll_once(&running).checkpoints_processed, 1);

        let entries = ActivityLog::new(dir.path().join("activity.jsonl"))
            .read_entries()
            .unwrap();
        let warning = entries
            .iter()
            .find(|e| e.level == activity::LogLevel::Warning)
            .expect("warning entry");
        let context = warning.context.as_ref().unwrap();
        assert_eq!(context["conversation"], "conv-big");
        assert!(context["warnings"][0]
            .as_str()
            .unwrap()
            .contains("artifact is large"));
    }

    #[test]
    fn test_clean_checkpoint_logs_no_warning() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Delete);
        w.start().unwrap();
        fs::write(dir.path().join("watch/a.json"), CHECKPOINT).unwrap();

        let running = AtomicBool::new(true);
        w.poll_once(&running);

        let entries = ActivityLog::new(dir.path().join("activity.jsonl"))
            .read_entries()
            .unwrap();
        assert!(entries
            .iter()
            .all(|e| e.level != activity::LogLevel::Warning));
    }

    #[test]
    fn test_shutdown_request_stops_new_work() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Delete);
        w.start().unwrap();
        fs::write(dir.path().join("watch/a.json"), CHECKPOINT).unwrap();

        let running = AtomicBool::new(false);
        let report = w.poll_once(&running);
        assert_eq!(report, PollReport::default());
        assert!(dir.path().join("watch/a.json").exists());
    }

    #[test]
    fn test_run_exits_when_flag_cleared() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Delete);
        let running = AtomicBool::new(false);
        let state = w.run(&running).unwrap();
        assert_eq!(state.pid, 4242);
        assert_eq!(w.daemon_state(), DaemonState::Stopped);
        assert!(!w.options().state_file().exists());
    }

    #[test]
    fn test_cache_chunks_are_consolidated() {
        let dir = TempDir::new().unwrap();
        let mut w = watcher(&dir, ChunkDisposal::Delete);
        w.start().unwrap();
        let chunk_dir = dir.path().join("watch/cache/augment/conv-c");
        fs::create_dir_all(&chunk_dir).unwrap();
        fs::write(
            chunk_dir.join("0001.json"),
            r#"{"request_message":"Fix the build","response_text":"I will fix it."}"#,
        )
        .unwrap();

        let report = w.poll_once(&AtomicBool::new(true));
        assert_eq!(report.conversations_consolidated, 1);
        assert!(dir.path().join("out/.aicf/conv-c.aicf").exists());
        assert!(!chunk_dir.join("0001.json").exists());
    }

    #[test]
    fn test_from_config() {
        let config = WatcherConfig {
            archive_processed: false,
            ..Default::default()
        };
        let options = WatcherOptions::from_config(
            &config,
            &RenderConfig::default(),
            PathBuf::from("/w"),
            PathBuf::from("/o"),
            PathBuf::from("/a.jsonl"),
        );
        assert_eq!(options.poll_interval, Duration::from_millis(5000));
        assert_eq!(options.disposal, ChunkDisposal::Delete);
        assert_eq!(options.state_file(), PathBuf::from("/w/.watcher-state.json"));
    }
}
