//! aicf-watch - poll for checkpoints and cache chunks and write memory files
//!
//! The daemon watches one directory:
//! - `<watch-dir>/*.json` - checkpoint files, processed then archived
//! - `<watch-dir>/cache/<platform>/...` - capture chunks, consolidated per conversation
//! - `<watch-dir>/.watcher-state.json` - present while the daemon runs
//!
//! Uses XDG Base Directory specification for file locations:
//! - Activity log: $XDG_STATE_HOME/aicf/activity.jsonl
//! - Logs: $XDG_STATE_HOME/aicf/aicf.log (~/.local/state/aicf/aicf.log)
//! - Config: $XDG_CONFIG_HOME/aicf/config.toml (~/.config/aicf/config.toml)

mod process_lock;

use aicf_core::{Config, Watcher, WatcherOptions};
use anyhow::{Context, Result};
use clap::Parser;
use process_lock::acquire_watcher_lock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Activity log file name inside the state directory.
const ACTIVITY_LOG_FILE: &str = "activity.jsonl";

#[derive(Parser)]
#[command(name = "aicf-watch")]
#[command(about = "Watch for conversation checkpoints and write memory files")]
#[command(version)]
struct Args {
    /// Directory to poll (overrides `watcher.watch_dir`)
    #[arg(short, long)]
    watch_dir: Option<PathBuf>,

    /// Directory receiving `.aicf/` and `.ai/` (overrides `watcher.output_dir`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Poll interval in milliseconds (overrides `watcher.poll_interval_ms`)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Also log to stderr at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = aicf_core::logging::init(&config.logging, args.verbose)
        .context("failed to initialize logging")?;

    let watch_dir = args
        .watch_dir
        .or_else(|| config.watcher.watch_dir.clone())
        .unwrap_or_else(Config::default_watch_dir);
    let output_dir = match args.output.or_else(|| config.watcher.output_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };

    let mut options = WatcherOptions::from_config(
        &config.watcher,
        &config.render,
        watch_dir,
        output_dir,
        Config::state_dir().join(ACTIVITY_LOG_FILE),
    );
    if let Some(interval) = args.interval {
        if interval == 0 {
            anyhow::bail!("--interval must be greater than zero");
        }
        options.poll_interval = Duration::from_millis(interval);
    }

    std::fs::create_dir_all(&options.watch_dir).with_context(|| {
        format!(
            "failed to create watch directory: {}",
            options.watch_dir.display()
        )
    })?;
    let lock =
        acquire_watcher_lock(&options.watch_dir).context("failed to acquire watcher lock")?;
    tracing::debug!(lock = %lock.path().display(), "Watcher lock acquired");

    println!("Watching:  {}", options.watch_dir.display());
    println!("Output:    {}", options.output_dir.display());
    println!("Activity:  {}", options.activity_log.display());

    let mut watcher = Watcher::new(options);
    let running = Arc::new(AtomicBool::new(true));

    if args.once {
        watcher.start().context("failed to start watcher")?;
        let report = watcher.poll_once(&running);
        watcher.stop().context("failed to stop watcher")?;

        println!("\nPoll complete:");
        println!("  Checkpoints processed: {}", report.checkpoints_processed);
        println!("  Checkpoints failed:    {}", report.checkpoints_failed);
        println!("  Checkpoints skipped:   {}", report.checkpoints_skipped);
        println!("  Conversations merged:  {}", report.conversations_consolidated);
        println!("  Consolidation errors:  {}", report.consolidation_errors);
        return Ok(());
    }

    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    println!(
        "Watch mode active (poll every {}ms). Press Ctrl+C to stop.",
        watcher.options().poll_interval.as_millis()
    );

    let state = watcher.run(&running).context("watcher failed")?;

    println!("\nWatcher stopped:");
    println!("  Processed: {}", state.processed_count);
    println!("  Errors:    {}", state.error_count);
    drop(lock);
    Ok(())
}
