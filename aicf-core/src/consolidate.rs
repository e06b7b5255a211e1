//! Cache consolidation agent
//!
//! Platform cache writers drop small raw capture chunks into a cache
//! directory, independently of this process:
//!
//! ```text
//! <cache>/
//! ├── augment/
//! │   ├── 1736000000000-0001.json          # chunk, conversation from payload
//! │   └── conv-42/1736000000500-0002.txt   # chunk for conversation conv-42
//! ├── generic/...
//! ├── .merged/<conversation>.json          # messages merged so far
//! ├── .archive/<platform>/...              # released chunks (archive mode)
//! └── .failed/<platform>/...               # chunks no parser could read
//! ```
//!
//! Each pass loads every pending chunk in key order, parses it, groups the
//! messages by conversation, merges them with what earlier passes stored,
//! drops duplicates and hands each conversation to a [`ConversationSink`].
//! A chunk is archived or deleted only after every conversation it
//! contributed to was persisted; otherwise it stays for the next pass.

use crate::error::{Error, Result};
use crate::parse::parse_payload;
use crate::pipeline::{file_stem, ConversationSink};
use crate::storage::{FileManager, WriteOptions};
use crate::types::{CacheChunk, Conversation, Message, SourcePlatform};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Merged conversation store, relative to the cache root.
pub const MERGED_DIR: &str = ".merged";
/// Released chunks in archive mode, relative to the cache root.
pub const ARCHIVE_DIR: &str = ".archive";
/// Chunks that could not be parsed, relative to the cache root.
pub const FAILED_DIR: &str = ".failed";

/// What happens to a chunk once it is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDisposal {
    Archive,
    Delete,
}

/// Totals for one consolidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub chunks_found: usize,
    pub chunks_released: usize,
    pub chunks_quarantined: usize,
    pub conversations_written: usize,
    /// Messages added to merged conversations (duplicates excluded)
    pub messages_merged: usize,
    pub duplicates_dropped: usize,
    /// One entry per failed conversation or chunk
    pub errors: Vec<String>,
}

/// Merges cache chunks into per-conversation analyses.
#[derive(Debug, Clone)]
pub struct CacheConsolidationAgent {
    cache_dir: PathBuf,
    disposal: ChunkDisposal,
    files: FileManager,
}

/// Messages gathered for one conversation during a pass.
struct Group {
    source: SourcePlatform,
    messages: Vec<Message>,
}

impl CacheConsolidationAgent {
    pub fn new(cache_dir: impl Into<PathBuf>, disposal: ChunkDisposal) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            disposal,
            files: FileManager::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// List pending chunks, ordered by key.
    pub fn load_chunks(&self) -> Result<Vec<CacheChunk>> {
        if !self.cache_dir.is_dir() {
            return Ok(Vec::new());
        }

        let root = glob::Pattern::escape(&self.cache_dir.to_string_lossy());
        let mut chunks = Vec::new();
        for pattern in [format!("{root}/*/*"), format!("{root}/*/*/*")] {
            let entries = glob::glob(&pattern)
                .map_err(|e| Error::file_op(&self.cache_dir, e))?;
            for path in entries.flatten() {
                if let Some(chunk) = self.read_chunk(&path)? {
                    chunks.push(chunk);
                }
            }
        }

        chunks.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.path.cmp(&b.path)));
        Ok(chunks)
    }

    fn read_chunk(&self, path: &Path) -> Result<Option<CacheChunk>> {
        if !path.is_file() {
            return Ok(None);
        }
        let Ok(relative) = path.strip_prefix(&self.cache_dir) else {
            return Ok(None);
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.iter().any(|p| p.starts_with('.')) {
            return Ok(None);
        }

        let source_platform = parts[0].parse().unwrap_or(SourcePlatform::Unknown);
        let conversation_hint = (parts.len() == 3).then(|| parts[1].clone());
        let key = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let captured_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let raw_payload = self.files.read(path)?;

        Ok(Some(CacheChunk {
            source_platform,
            captured_at,
            raw_payload,
            path: path.to_path_buf(),
            key,
            conversation_hint,
        }))
    }

    /// Run one consolidation pass.
    pub fn consolidate(&self, sink: &dyn ConversationSink) -> Result<ConsolidationReport> {
        let chunks = self.load_chunks()?;
        let mut report = ConsolidationReport {
            chunks_found: chunks.len(),
            ..Default::default()
        };
        if chunks.is_empty() {
            return Ok(report);
        }

        // Conversation order follows first appearance in key order
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Group> = HashMap::new();
        let mut chunk_targets: Vec<(usize, BTreeSet<String>)> = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let default_id = chunk
                .conversation_hint
                .clone()
                .unwrap_or_else(|| format!("{}-session", chunk.source_platform));
            let messages = match parse_payload(chunk.source_platform, &chunk.raw_payload, &default_id) {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(chunk = %chunk.path.display(), error = %e, "Quarantining unparseable chunk");
                    report.errors.push(format!("{}: {e}", chunk.path.display()));
                    self.quarantine(chunk)?;
                    report.chunks_quarantined += 1;
                    continue;
                }
            };

            let mut targets = BTreeSet::new();
            for message in messages {
                let id = message.conversation_id.clone();
                let group = groups.entry(id.clone()).or_insert_with(|| {
                    order.push(id.clone());
                    Group {
                        source: chunk.source_platform,
                        messages: Vec::new(),
                    }
                });
                group.messages.push(message);
                targets.insert(id);
            }
            chunk_targets.push((i, targets));
        }

        let mut persisted: BTreeSet<String> = BTreeSet::new();
        for id in &order {
            let Some(group) = groups.remove(id) else { continue };
            match self.merge_and_persist(id, group, sink, &mut report) {
                Ok(()) => {
                    persisted.insert(id.clone());
                    report.conversations_written += 1;
                }
                Err(e) => {
                    tracing::error!(conversation = %id, error = %e, "Consolidation failed; chunks kept for retry");
                    report.errors.push(format!("{id}: {e}"));
                }
            }
        }

        for (i, targets) in chunk_targets {
            if targets.iter().all(|id| persisted.contains(id)) {
                self.release(&chunks[i])?;
                report.chunks_released += 1;
            }
        }

        tracing::info!(
            chunks = report.chunks_found,
            released = report.chunks_released,
            conversations = report.conversations_written,
            merged = report.messages_merged,
            duplicates = report.duplicates_dropped,
            errors = report.errors.len(),
            "Consolidation pass finished"
        );

        Ok(report)
    }

    fn merge_and_persist(
        &self,
        id: &str,
        group: Group,
        sink: &dyn ConversationSink,
        report: &mut ConsolidationReport,
    ) -> Result<()> {
        let stored = self.load_merged(id)?;
        let (mut messages, source) = match stored {
            Some(conv) => (conv.messages, conv.source),
            None => (Vec::new(), group.source),
        };

        let mut added = 0;
        let mut dropped = 0;
        for message in group.messages {
            if messages.iter().any(|m| same_message(m, &message)) {
                dropped += 1;
            } else {
                messages.push(message);
                added += 1;
            }
        }

        let conversation = Conversation::from_messages(id, source, messages);
        sink.persist(&conversation)?;

        let json = serde_json::to_string_pretty(&conversation)?;
        self.files
            .write(&self.merged_path(id), &json, WriteOptions::default())?;

        report.messages_merged += added;
        report.duplicates_dropped += dropped;
        Ok(())
    }

    /// Path of the merged store for a conversation.
    pub fn merged_path(&self, conversation_id: &str) -> PathBuf {
        self.cache_dir
            .join(MERGED_DIR)
            .join(format!("{}.json", file_stem(conversation_id)))
    }

    /// Previously merged conversation, if any.
    pub fn load_merged(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let path = self.merged_path(conversation_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = self.files.read(&path)?;
        let conversation = serde_json::from_str(&content)
            .map_err(|e| Error::parsing("merged", format!("{}: {e}", path.display())))?;
        Ok(Some(conversation))
    }

    fn release(&self, chunk: &CacheChunk) -> Result<()> {
        match self.disposal {
            ChunkDisposal::Delete => self.files.remove(&chunk.path),
            ChunkDisposal::Archive => {
                let dir = self.side_dir(ARCHIVE_DIR, chunk);
                self.files.archive(&chunk.path, &dir).map(|_| ())
            }
        }
    }

    fn quarantine(&self, chunk: &CacheChunk) -> Result<()> {
        let dir = self.side_dir(FAILED_DIR, chunk);
        self.files.archive(&chunk.path, &dir).map(|_| ())
    }

    fn side_dir(&self, name: &str, chunk: &CacheChunk) -> PathBuf {
        let mut dir = self.cache_dir.join(name).join(chunk.source_platform.as_str());
        if let Some(hint) = &chunk.conversation_hint {
            dir.push(file_stem(hint));
        }
        dir
    }
}

/// Duplicate test across captures: same role and exact content, and the same
/// timestamp whenever both sides carry one.
fn same_message(a: &Message, b: &Message) -> bool {
    a.role == b.role
        && a.content == b.content
        && match (a.timestamp, b.timestamp) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        }
}
