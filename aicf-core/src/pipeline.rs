//! Analyze, render, write and validate one conversation
//!
//! ```text
//! Checkpoint ──► ConversationOrchestrator ──► MemoryFileWriter
//!                                                   │
//!                  <out>/.aicf/<id>.aicf  ◄─────────┤ FileManager (atomic)
//!                  <out>/.ai/<id>.md      ◄─────────┘
//!                                                   │
//!                                             FileValidator
//! ```
//!
//! A pipeline run succeeds only when both artifacts were written and
//! validated. Validator warnings are passed back; validator errors fail the
//! run with [`Error::Validation`].

use crate::analyze::ConversationOrchestrator;
use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::render::MemoryFileWriter;
use crate::storage::{FileManager, WriteOptions};
use crate::types::{AnalysisResult, Checkpoint, Conversation};
use crate::validate::FileValidator;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Directory under the output root for structured artifacts.
pub const STRUCTURED_DIR: &str = ".aicf";
/// Directory under the output root for narrative artifacts.
pub const NARRATIVE_DIR: &str = ".ai";

/// Anything that can durably persist an analyzed conversation.
///
/// The cache consolidation agent hands merged conversations to a sink and
/// only releases its chunks when the sink succeeds.
pub trait ConversationSink {
    fn persist(&self, conversation: &Conversation) -> Result<PipelineOutcome>;
}

/// Artifacts produced for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub conversation_id: String,
    pub structured_path: PathBuf,
    pub narrative_path: PathBuf,
    pub bytes_written: usize,
    /// Non-fatal validator findings
    pub warnings: Vec<String>,
}

/// End-to-end processing into an output directory.
#[derive(Debug)]
pub struct MemoryPipeline {
    output_dir: PathBuf,
    orchestrator: ConversationOrchestrator,
    writer: MemoryFileWriter,
    files: FileManager,
    validator: FileValidator,
}

impl MemoryPipeline {
    pub fn new(output_dir: impl Into<PathBuf>, render: &RenderConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            orchestrator: ConversationOrchestrator::new(),
            writer: MemoryFileWriter::new(render),
            files: FileManager::new(),
            validator: FileValidator::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the structured artifact for `conversation_id` is written.
    pub fn structured_path(&self, conversation_id: &str) -> PathBuf {
        self.output_dir
            .join(STRUCTURED_DIR)
            .join(format!("{}.aicf", file_stem(conversation_id)))
    }

    /// Where the narrative artifact for `conversation_id` is written.
    pub fn narrative_path(&self, conversation_id: &str) -> PathBuf {
        self.output_dir
            .join(NARRATIVE_DIR)
            .join(format!("{}.md", file_stem(conversation_id)))
    }

    /// Read and process a checkpoint JSON file.
    pub fn process_checkpoint_file(&self, path: &Path) -> Result<PipelineOutcome> {
        let content = self.files.read(path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&content)
            .map_err(|e| Error::parsing("checkpoint", format!("{}: {e}", path.display())))?;
        self.process_checkpoint(&checkpoint)
    }

    pub fn process_checkpoint(&self, checkpoint: &Checkpoint) -> Result<PipelineOutcome> {
        let result = self.orchestrator.analyze(checkpoint)?;
        self.write_result(&result)
    }

    pub fn process_conversation(&self, conversation: &Conversation) -> Result<PipelineOutcome> {
        let result = self.orchestrator.analyze_conversation(conversation)?;
        self.write_result(&result)
    }

    fn write_result(&self, result: &AnalysisResult) -> Result<PipelineOutcome> {
        let rendered = self.writer.render(result);
        let structured_path = self.structured_path(&result.conversation_id);
        let narrative_path = self.narrative_path(&result.conversation_id);

        let mut bytes_written = 0;
        let mut warnings = Vec::new();
        for (path, content) in [
            (&structured_path, &rendered.structured),
            (&narrative_path, &rendered.narrative),
        ] {
            let outcome = self.files.write(path, content, WriteOptions::default())?;
            bytes_written += outcome.bytes_written;

            let report = self.validator.validate(path)?;
            if !report.is_valid {
                return Err(Error::Validation {
                    path: path.clone(),
                    errors: report.errors,
                });
            }
            warnings.extend(
                report
                    .warnings
                    .into_iter()
                    .map(|w| format!("{}: {w}", path.display())),
            );
        }

        tracing::info!(
            conversation = %result.conversation_id,
            structured = %structured_path.display(),
            narrative = %narrative_path.display(),
            bytes = bytes_written,
            "Wrote memory files"
        );

        Ok(PipelineOutcome {
            conversation_id: result.conversation_id.clone(),
            structured_path,
            narrative_path,
            bytes_written,
            warnings,
        })
    }
}

impl ConversationSink for MemoryPipeline {
    fn persist(&self, conversation: &Conversation) -> Result<PipelineOutcome> {
        self.process_conversation(conversation)
    }
}

/// Length of the id digest appended to rewritten stems.
const STEM_DIGEST_LEN: usize = 8;

/// File-name-safe form of a conversation id.
///
/// Ids that are already safe are used as they are. Any other id is cleaned
/// and gets a short digest of the raw id appended, so ids that clean to the
/// same text (`a b`, `a/b`) still get their own files.
pub fn file_stem(conversation_id: &str) -> String {
    let cleaned: String = conversation_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = match cleaned.trim_start_matches('.') {
        "" => "conversation",
        rest => rest,
    };
    if cleaned == conversation_id {
        return cleaned.to_string();
    }
    let digest = hex::encode(Sha256::digest(conversation_id.as_bytes()));
    format!("{cleaned}-{}", &digest[..STEM_DIGEST_LEN])
}
