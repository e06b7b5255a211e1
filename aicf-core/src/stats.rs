//! Structured artifact efficiency statistics
//!
//! Measures how compact the `.aicf` artifacts in a directory are: lines,
//! approximate tokens, bytes and semantic blocks (`@SECTION` markers), plus
//! an estimate of the space saved compared with a JSON rendering.

use crate::error::{Error, Result};
use crate::storage::FileManager;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Rough JSON cost of one token, in bytes.
pub const JSON_BYTES_PER_TOKEN: usize = 15;

/// Savings above this percentage count as high compression.
pub const HIGH_COMPRESSION_PERCENT: f64 = 90.0;

fn token_split_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s\W]+").expect("valid regex"))
}

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[A-Z_]+").expect("valid regex"))
}

/// Approximate token count: runs of word characters.
pub fn count_tokens(text: &str) -> usize {
    token_split_regex()
        .split(text)
        .filter(|word| !word.is_empty())
        .count()
}

/// Figures for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEfficiency {
    pub path: PathBuf,
    /// Non-blank lines
    pub lines: usize,
    pub tokens: usize,
    pub size_bytes: usize,
    pub semantic_blocks: usize,
}

impl FileEfficiency {
    pub fn from_content(path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: path.into(),
            lines: content.lines().filter(|l| !l.trim().is_empty()).count(),
            tokens: count_tokens(content),
            size_bytes: content.len(),
            semantic_blocks: block_regex().find_iter(content).count(),
        }
    }

    pub fn tokens_per_byte(&self) -> f64 {
        ratio(self.tokens, self.size_bytes)
    }
}

/// Figures for a directory of artifacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EfficiencyReport {
    pub files: Vec<FileEfficiency>,
}

impl EfficiencyReport {
    pub fn total_tokens(&self) -> usize {
        self.files.iter().map(|f| f.tokens).sum()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    pub fn total_blocks(&self) -> usize {
        self.files.iter().map(|f| f.semantic_blocks).sum()
    }

    pub fn tokens_per_byte(&self) -> f64 {
        ratio(self.total_tokens(), self.total_bytes())
    }

    pub fn blocks_per_kb(&self) -> f64 {
        ratio(self.total_blocks(), self.total_bytes()) * 1000.0
    }

    pub fn estimated_json_bytes(&self) -> usize {
        self.total_tokens() * JSON_BYTES_PER_TOKEN
    }

    /// Percentage saved compared with the JSON estimate, if there is anything to compare.
    pub fn savings_vs_json_percent(&self) -> Option<f64> {
        let json = self.estimated_json_bytes();
        if json == 0 {
            return None;
        }
        Some((json as f64 - self.total_bytes() as f64) / json as f64 * 100.0)
    }

    pub fn is_high_compression(&self) -> bool {
        self.savings_vs_json_percent()
            .map_or(false, |p| p > HIGH_COMPRESSION_PERCENT)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Analyze every `*.aicf` file directly inside `dir`, in name order.
pub fn analyze_dir(dir: &Path) -> Result<EfficiencyReport> {
    let files = FileManager::new();
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    let entries =
        glob::glob(&format!("{root}/*.aicf")).map_err(|e| Error::file_op(dir, e))?;

    let mut paths: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
    paths.sort();

    let mut report = EfficiencyReport::default();
    for path in paths {
        let content = files.read(&path)?;
        let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
        report.files.push(FileEfficiency::from_content(name, &content));
    }
    Ok(report)
}
