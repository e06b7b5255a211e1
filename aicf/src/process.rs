//! aicf-process - turn checkpoint files into memory files
//!
//! Each checkpoint is parsed, analyzed and written as two artifacts under
//! the output directory:
//! - `.aicf/<conversation>.aicf` - structured, machine-readable
//! - `.ai/<conversation>.md` - narrative, human-readable
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/aicf/aicf.log (~/.local/state/aicf/aicf.log)
//! - Config: $XDG_CONFIG_HOME/aicf/config.toml (~/.config/aicf/config.toml)

use aicf_core::{Config, MemoryPipeline};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aicf-process")]
#[command(about = "Write memory files for conversation checkpoints")]
#[command(version)]
struct Args {
    /// Checkpoint JSON files to process
    #[arg(required = true)]
    checkpoints: Vec<PathBuf>,

    /// Directory receiving `.aicf/` and `.ai/` (defaults to the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

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

    let output_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    tracing::info!(output = %output_dir.display(), count = args.checkpoints.len(), "aicf-process starting");

    let pipeline = MemoryPipeline::new(&output_dir, &config.render);
    let mut failures = 0usize;

    for path in &args.checkpoints {
        match pipeline.process_checkpoint_file(path) {
            Ok(outcome) => {
                println!("{}: conversation {}", path.display(), outcome.conversation_id);
                println!("  Structured: {}", outcome.structured_path.display());
                println!("  Narrative:  {}", outcome.narrative_path.display());
                for warning in &outcome.warnings {
                    println!("  Warning: {}", warning);
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(path = %path.display(), error = %e, "Checkpoint failed");
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!(
            "{} of {} checkpoint(s) failed",
            failures,
            args.checkpoints.len()
        );
    }
    Ok(())
}
