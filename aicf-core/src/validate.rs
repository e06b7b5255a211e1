//! Post-write artifact validation
//!
//! The validator never blocks a write; it reports on a file after the fact.
//! Checks depend on the file extension:
//!
//! | Extension | Checks |
//! |-----------|--------|
//! | `.aicf`   | parses; required sections present; `version` and timestamps parse |
//! | `.md`     | at least one heading |
//! | other     | non-empty and below [`MAX_ARTIFACT_BYTES`] |

use crate::error::Result;
use crate::render::{narrative, structured};
use crate::storage::FileManager;
use chrono::DateTime;
use std::path::Path;

/// Upper bound for any artifact.
pub const MAX_ARTIFACT_BYTES: usize = 64 * 1024 * 1024;

/// Structured artifacts above this size are reported as a warning.
const LARGE_ARTIFACT_BYTES: usize = 1024 * 1024;

/// Outcome of validating one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Artifact format, from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Structured,
    Narrative,
    Generic,
}

impl ArtifactKind {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("aicf") => ArtifactKind::Structured,
            Some("md") => ArtifactKind::Narrative,
            _ => ArtifactKind::Generic,
        }
    }
}

/// Validates written artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileValidator {
    files: FileManager,
}

impl FileValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the file at `path`.
    ///
    /// Returns `Err` only when the file cannot be read; format problems are
    /// reported in the [`ValidationReport`].
    pub fn validate(&self, path: &Path) -> Result<ValidationReport> {
        let content = self.files.read(path)?;
        let report = validate_content(ArtifactKind::for_path(path), &content);

        if !report.is_valid {
            tracing::warn!(
                path = %path.display(),
                errors = ?report.errors,
                "Artifact failed validation"
            );
        }
        Ok(report)
    }
}

/// Validate artifact text of a known kind.
pub fn validate_content(kind: ArtifactKind, content: &str) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if content.trim().is_empty() {
        errors.push("file is empty".to_string());
        return ValidationReport::from_findings(errors, warnings);
    }
    if content.len() > MAX_ARTIFACT_BYTES {
        errors.push(format!(
            "file is {} bytes, above the {} byte limit",
            content.len(),
            MAX_ARTIFACT_BYTES
        ));
        return ValidationReport::from_findings(errors, warnings);
    }

    match kind {
        ArtifactKind::Structured => check_structured(content, &mut errors, &mut warnings),
        ArtifactKind::Narrative => {
            if !narrative::has_heading(content) {
                errors.push("narrative has no heading".to_string());
            }
        }
        ArtifactKind::Generic => {}
    }

    ValidationReport::from_findings(errors, warnings)
}

fn check_structured(content: &str, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    let doc = match structured::parse(content) {
        Ok(doc) => doc,
        Err(e) => {
            errors.push(e.to_string());
            return;
        }
    };

    for name in structured::REQUIRED_SECTIONS {
        if doc.section(name).is_none() {
            errors.push(format!("missing section @{name}"));
        }
    }

    if let Some(header) = doc.section(structured::SECTION_HEADER) {
        match header.get("version").map(|e| e.value()) {
            None => errors.push("missing field version in @AICF".to_string()),
            Some(v) if !is_version(&v) => errors.push(format!("unparseable version {v:?}")),
            Some(v) if v != structured::FORMAT_VERSION => {
                warnings.push(format!("format version {v} differs from {}", structured::FORMAT_VERSION))
            }
            Some(_) => {}
        }
        check_timestamp(header.get("generated_at"), "generated_at", errors);
    }

    if let Some(conversation) = doc.section(structured::SECTION_CONVERSATION) {
        if conversation.label.as_deref().map_or(true, str::is_empty) {
            errors.push("@CONVERSATION has no id".to_string());
        }
        for key in ["source", "total_messages"] {
            if conversation.get(key).is_none() {
                errors.push(format!("missing field {key} in @CONVERSATION"));
            }
        }
    }

    if let Some(state) = doc.section(structured::SECTION_STATE) {
        check_timestamp(state.get("last_update"), "last_update", errors);
    }

    if content.len() > LARGE_ARTIFACT_BYTES {
        warnings.push(format!("artifact is large ({} bytes)", content.len()));
    }
}

fn check_timestamp(entry: Option<&structured::Entry>, key: &str, errors: &mut Vec<String>) {
    match entry.map(|e| e.value()) {
        None => errors.push(format!("missing field {key}")),
        Some(ts) if DateTime::parse_from_rfc3339(&ts).is_err() => {
            errors.push(format!("unparseable timestamp {key}={ts:?}"))
        }
        Some(_) => {}
    }
}

fn is_version(v: &str) -> bool {
    !v.is_empty()
        && v.split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ConversationOrchestrator;
    use crate::render::MemoryFileWriter;
    use crate::storage::WriteOptions;
    use crate::types::{Conversation, Message, Role, SourcePlatform};
    use tempfile::TempDir;

    fn rendered() -> crate::render::RenderedMemory {
        let messages = vec![
            Message::new("v", Role::User, "How do I implement a parser?", None),
            Message::new("v", Role::Assistant, "Here is how.", None),
        ];
        let conversation = Conversation::from_messages("v", SourcePlatform::Generic, messages);
        let result = ConversationOrchestrator::new()
            .analyze_conversation(&conversation)
            .unwrap();
        MemoryFileWriter::default().render(&result)
    }

    #[test]
    fn test_round_trip_written_artifacts_are_valid() {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new();
        let memory = rendered();
        let aicf = dir.path().join("v.aicf");
        let md = dir.path().join("v.md");
        fm.write(&aicf, &memory.structured, WriteOptions::default()).unwrap();
        fm.write(&md, &memory.narrative, WriteOptions::default()).unwrap();

        let validator = FileValidator::new();
        let report = validator.validate(&aicf).unwrap();
        assert!(report.is_valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert!(validator.validate(&md).unwrap().is_valid);
    }

    #[test]
    fn test_structured_missing_sections() {
        let report = validate_content(
            ArtifactKind::Structured,
            "@AICF\nversion=3.0\ngenerated_at=2025-01-01T00:00:00+00:00\n",
        );
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e == "missing section @STATE"));
    }

    #[test]
    fn test_structured_bad_version_and_timestamp() {
        let text = rendered()
            .structured
            .replacen("version=3.0", "version=three", 1)
            .replacen("generated_at=", "generated_at=x", 1);
        let report = validate_content(ArtifactKind::Structured, &text);
        assert!(report.errors.iter().any(|e| e.contains("unparseable version")));
        assert!(report.errors.iter().any(|e| e.contains("generated_at")));
    }

    #[test]
    fn test_structured_other_version_is_warning() {
        let text = rendered().structured.replacen("version=3.0", "version=2.1", 1);
        let report = validate_content(ArtifactKind::Structured, &text);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_narrative_requires_heading() {
        let report = validate_content(ArtifactKind::Narrative, "just prose");
        assert!(!report.is_valid);
    }

    #[test]
    fn test_generic_bounds() {
        assert!(!validate_content(ArtifactKind::Generic, "  \n").is_valid);
        assert!(validate_content(ArtifactKind::Generic, "data").is_valid);
    }

    #[test]
    fn test_kind_for_path() {
        assert_eq!(ArtifactKind::for_path(Path::new("a.aicf")), ArtifactKind::Structured);
        assert_eq!(ArtifactKind::for_path(Path::new("a.md")), ArtifactKind::Narrative);
        assert_eq!(ArtifactKind::for_path(Path::new("a.json")), ArtifactKind::Generic);
    }

    #[test]
    fn test_unreadable_file_is_error() {
        assert!(FileValidator::new()
            .validate(Path::new("/no/such/file.aicf"))
            .is_err());
    }
}
