//! Parsing layer: raw platform captures into canonical messages
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Raw payload    │ ──► │  detect_parser   │ ──► │  Vec<Message>   │
//! │ (chunk / rawData)│    │                  │     │  (canonical)    │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │  PlatformParser      │
//!                    │  ├─ AugmentParser    │
//!                    │  └─ GenericParser    │
//!                    └──────────────────────┘
//! ```
//!
//! The set of parsers is closed (one per [`SourcePlatform`]). Detection tries
//! dedicated parsers in priority order and falls back to the generic parser.

mod parser;
pub mod parsers;

pub use parser::PlatformParser;
pub use parsers::{create_all_parsers, parser_for};

use crate::error::Result;
use crate::types::{Message, SourcePlatform};

/// Pick the first parser whose detector accepts the payload.
///
/// Never fails: the generic parser accepts everything.
pub fn detect_parser(payload: &str) -> Box<dyn PlatformParser> {
    create_all_parsers()
        .into_iter()
        .find(|p| p.detect(payload))
        .unwrap_or_else(|| Box::new(parsers::GenericParser::new()))
}

/// Parse a payload declared to come from `platform`.
///
/// The platform's own parser is used when its detector accepts the payload;
/// otherwise (and for [`SourcePlatform::Unknown`]) the format is detected.
pub fn parse_payload(
    platform: SourcePlatform,
    payload: &str,
    conversation_id: &str,
) -> Result<Vec<Message>> {
    let parser = match parser_for(platform) {
        Some(p) if p.detect(payload) => p,
        _ => detect_parser(payload),
    };

    tracing::debug!(
        declared = %platform,
        parser = %parser.platform(),
        bytes = payload.len(),
        "Parsing payload"
    );

    parser.parse(payload, conversation_id)
}
