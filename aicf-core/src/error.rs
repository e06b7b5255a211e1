//! Error types for aicf-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the aicf-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Raw payload is malformed beyond recognition for the given platform
    #[error("parse error in {platform} payload: {message}")]
    Parsing { platform: String, message: String },

    /// Internal fault inside an extractor (never "nothing found")
    #[error("{extractor} extractor failed: {message}")]
    Extraction { extractor: String, message: String },

    /// Filesystem operation failed (permissions, disk full, missing path)
    #[error("file operation failed on {}: {message}", path.display())]
    FileOperation { path: PathBuf, message: String },

    /// Artifact failed its post-write format check
    #[error("validation failed for {}: {}", path.display(), errors.join("; "))]
    Validation { path: PathBuf, errors: Vec<String> },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a [`Error::FileOperation`] from an IO error and the path it concerns.
    pub fn file_op(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::FileOperation {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Build a [`Error::Parsing`] for a platform.
    pub fn parsing(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parsing {
            platform: platform.into(),
            message: message.into(),
        }
    }

    /// Build a [`Error::Extraction`] for an extractor.
    pub fn extraction(extractor: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Extraction {
            extractor: extractor.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for aicf-core
pub type Result<T> = std::result::Result<T, Error>;
