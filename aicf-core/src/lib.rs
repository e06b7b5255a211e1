//! # aicf-core
//!
//! Core library for aicf - AI conversation capture and memory files.
//!
//! This library provides:
//! - A canonical message model for conversations from several platforms
//! - Platform parsers with format detection
//! - A lossless summarizer and six pattern-based fact extractors
//! - Structured (AICF) and narrative (markdown) renderers
//! - Atomic file I/O, post-write validation and cache consolidation
//! - The watcher daemon that drives the pipeline
//!
//! ## Architecture
//!
//! Data flows strictly downward:
//! - **Parse:** raw captures become ordered [`Message`] lists ([`parse`])
//! - **Analyze:** [`summary`] and [`extract`] produce an [`AnalysisResult`] ([`analyze`])
//! - **Persist:** [`render`], [`storage`] and [`validate`] write verified artifacts ([`pipeline`])
//! - **Drive:** [`consolidate`] merges cache chunks, [`watcher`] polls for work
//!
//! ## Example
//!
//! ```rust,no_run
//! use aicf_core::{Config, MemoryPipeline};
//! use std::path::Path;
//!
//! let config = Config::load().expect("failed to load config");
//! let pipeline = MemoryPipeline::new("./project", &config.render);
//! let outcome = pipeline
//!     .process_checkpoint_file(Path::new("checkpoint.json"))
//!     .expect("failed to process checkpoint");
//! println!("wrote {}", outcome.structured_path.display());
//! ```

// Re-export commonly used items at the crate root
pub use analyze::ConversationOrchestrator;
pub use config::Config;
pub use consolidate::{CacheConsolidationAgent, ChunkDisposal, ConsolidationReport};
pub use error::{Error, Result};
pub use pipeline::{ConversationSink, MemoryPipeline, PipelineOutcome};
pub use render::{MemoryFileWriter, RenderedMemory};
pub use storage::{FileManager, WriteOptions, WriteOutcome};
pub use types::*;
pub use validate::{FileValidator, ValidationReport};
pub use watcher::{DaemonState, Watcher, WatcherOptions};

// Public modules
pub mod analyze;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod extract;
pub mod logging;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod stats;
pub mod storage;
pub mod summary;
pub mod types;
pub mod validate;
pub mod watcher;
