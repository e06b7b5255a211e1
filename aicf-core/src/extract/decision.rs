//! Decision extraction
//!
//! Sentences containing a decision verb become [`Decision`] facts. The
//! decision text is the whole sentence; the context adds up to 50 characters
//! before and 150 after it, taken from the same turn.

use super::{locate, usable_summary, Extractor};
use crate::error::Result;
use crate::summary::transcript_turns;
use crate::types::{ConversationSummary, Decision, Impact, Message, Provenance};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

const CONTEXT_BEFORE: usize = 50;
const CONTEXT_AFTER: usize = 150;

fn decision_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(decided|decide|will|should|must|agreed|agree|chose|choose)\b")
            .expect("valid regex")
    })
}

fn high_impact_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(architect\w*|refactor\w*|migrat\w*|breaking|production)\b")
            .expect("valid regex")
    })
}

fn medium_impact_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(implement\w*|build\w*|create\w*|update\w*|improve\w*)\b")
            .expect("valid regex")
    })
}

fn impact_of(text: &str) -> Impact {
    if high_impact_regex().is_match(text) {
        Impact::High
    } else if medium_impact_regex().is_match(text) {
        Impact::Medium
    } else {
        Impact::Low
    }
}

#[derive(Debug, Default)]
pub struct DecisionExtractor;

impl DecisionExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for DecisionExtractor {
    type Output = Vec<Decision>;

    fn name(&self) -> &'static str {
        "decision"
    }

    fn extract(
        &self,
        messages: &[Message],
        summary: Option<&ConversationSummary>,
    ) -> Result<Vec<Decision>> {
        let mut decisions = Vec::new();

        if let Some(summary) = usable_summary(self.name(), summary)? {
            for turn in transcript_turns(summary) {
                // Transcript ordinals are positions in the whole conversation
                let (message_index, timestamp) = locate(messages, None, turn.ordinal);
                scan(
                    turn.text,
                    timestamp,
                    message_index,
                    Provenance::ConversationSummary,
                    &mut decisions,
                );
            }
        } else {
            for (i, message) in messages.iter().enumerate() {
                scan(
                    &message.content,
                    message.timestamp,
                    Some(i),
                    Provenance::IndividualMessage,
                    &mut decisions,
                );
            }
        }

        Ok(decisions)
    }
}

fn scan(
    text: &str,
    timestamp: Option<DateTime<Utc>>,
    message_index: Option<usize>,
    source: Provenance,
    out: &mut Vec<Decision>,
) {
    for (start, end) in sentence_spans(text) {
        let sentence = text[start..end].trim();
        if sentence.is_empty() || !decision_regex().is_match(sentence) {
            continue;
        }
        if out.iter().any(|d| d.decision == sentence) {
            continue;
        }
        out.push(Decision {
            timestamp,
            decision: sentence.to_string(),
            context: context_window(text, start, end).trim().to_string(),
            impact: impact_of(sentence),
            source,
            message_index,
        });
    }
}

/// Byte ranges of sentences. A sentence ends after `.`, `!` or `?` followed
/// by whitespace, or at a line break.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                None => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = end {
            if end > start {
                spans.push((start, end));
            }
            start = if c == '\n' { i + 1 } else { end };
        }
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

/// `text[start..end]` widened by up to [`CONTEXT_BEFORE`] characters before
/// and [`CONTEXT_AFTER`] characters after.
fn context_window(text: &str, start: usize, end: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_BEFORE.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_AFTER)
        .map_or(text.len(), |(i, _)| end + i);
    &text[from..to]
}
