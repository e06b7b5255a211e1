//! aicf-stats - inspect and maintain memory files
//!
//! Subcommands:
//! - `report [dir]` - efficiency figures for the `.aicf` artifacts in a directory
//! - `dedupe <file>` - drop repeated chat blocks from a narrative log (keeps a backup)
//! - `validate <file>...` - check artifacts, exiting non-zero if any is invalid

use aicf_core::render::narrative::{dedupe_log, DedupeStats};
use aicf_core::stats::{analyze_dir, EfficiencyReport};
use aicf_core::{Config, FileManager, FileValidator, WriteOptions};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "aicf-stats")]
#[command(about = "Inspect and maintain AICF memory files")]
#[command(version)]
struct Args {
    /// Also log to stderr at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report token and size efficiency of structured artifacts
    Report {
        /// Directory holding `.aicf` files
        #[arg(default_value = ".aicf")]
        dir: PathBuf,
    },
    /// Remove repeated chat blocks from a narrative log
    Dedupe {
        file: PathBuf,

        /// Show what would be removed without rewriting the file
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate structured or narrative artifacts
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = aicf_core::logging::init(&config.logging, args.verbose)
        .context("failed to initialize logging")?;

    match args.command {
        Command::Report { dir } => run_report(&dir),
        Command::Dedupe { file, dry_run } => run_dedupe(&file, dry_run),
        Command::Validate { files } => run_validate(&files),
    }
}

fn run_report(dir: &Path) -> Result<()> {
    let report = analyze_dir(dir)
        .with_context(|| format!("failed to analyze {}", dir.display()))?;

    if report.total_bytes() == 0 {
        println!("No valid files found in {}", dir.display());
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &EfficiencyReport) {
    println!(
        "{:<32} {:>7} {:>8} {:>9} {:>7} {:>10}",
        "File", "Lines", "Tokens", "Bytes", "Blocks", "Tok/byte"
    );
    for file in &report.files {
        println!(
            "{:<32} {:>7} {:>8} {:>9} {:>7} {:>10.3}",
            file.path.display(),
            file.lines,
            file.tokens,
            file.size_bytes,
            file.semantic_blocks,
            file.tokens_per_byte()
        );
    }

    println!("\nTotals:");
    println!("  Tokens:          {}", report.total_tokens());
    println!(
        "  Size:            {:.1} KB",
        report.total_bytes() as f64 / 1024.0
    );
    println!("  Semantic blocks: {}", report.total_blocks());
    println!("  Tokens per byte: {:.3}", report.tokens_per_byte());
    println!("  Blocks per KB:   {:.1}", report.blocks_per_kb());

    println!("\nCompared with JSON:");
    println!("  Estimated JSON:  {} bytes", report.estimated_json_bytes());
    if let Some(saved) = report.savings_vs_json_percent() {
        println!("  Saved:           {:.1}%", saved);
    }
    if report.is_high_compression() {
        println!("  Result:          >90% compression");
    } else {
        println!("  Result:          significant compression");
    }
}

fn run_dedupe(path: &Path, dry_run: bool) -> Result<()> {
    let files = FileManager::new();
    let content = files
        .read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let (deduped, stats) = dedupe_log(&content);

    print_dedupe(path, &stats);
    if stats.removed_lines == 0 {
        println!("Nothing to remove.");
        return Ok(());
    }
    if dry_run {
        println!("Dry run - file not modified");
        return Ok(());
    }

    let outcome = files
        .write(path, &deduped, WriteOptions::default().with_backup())
        .with_context(|| format!("failed to rewrite {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        removed_lines = stats.removed_lines,
        "Deduplicated narrative log"
    );
    if let Some(backup) = outcome.backup_path {
        println!("Backup:  {}", backup.display());
    }
    println!("Rewrote: {}", path.display());
    Ok(())
}

fn print_dedupe(path: &Path, stats: &DedupeStats) {
    println!("{}:", path.display());
    println!("  Original lines: {}", stats.original_lines);
    println!("  Final lines:    {}", stats.final_lines);
    println!("  Removed lines:  {}", stats.removed_lines);
    println!("  Conversations:  {}", stats.conversations);
    for block in &stats.removed {
        println!("  Removed duplicate: {}", block);
    }
}

fn run_validate(paths: &[PathBuf]) -> Result<()> {
    let validator = FileValidator::new();
    let mut invalid = 0usize;

    for path in paths {
        let report = validator
            .validate(path)
            .with_context(|| format!("failed to validate {}", path.display()))?;
        let status = if report.is_valid { "valid" } else { "INVALID" };
        println!("{}: {}", path.display(), status);
        for error in &report.errors {
            println!("  Error: {}", error);
        }
        for warning in &report.warnings {
            println!("  Warning: {}", warning);
        }
        if !report.is_valid {
            invalid += 1;
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} file(s) invalid", invalid, paths.len());
    }
    Ok(())
}
