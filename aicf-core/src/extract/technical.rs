//! Technical work extraction
//!
//! An assistant turn that uses a technical verb is captured whole. Turns that
//! also talk about scripts, pipelines or automation are classified
//! [`WorkType::AgentAutomation`].

use super::{locate, usable_summary, Extractor};
use crate::error::Result;
use crate::summary::assistant_turns;
use crate::types::{ConversationSummary, Message, Provenance, Role, TechnicalWork, WorkType};
use regex::Regex;
use std::sync::OnceLock;

fn verb_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(implement\w*|build\w*|built|fix\w*|refactor\w*|test\w*|configur\w*|deploy\w*|debug\w*|optimi[sz]\w*|migrat\w*|install\w*|integrat\w*|compil\w*|instrument\w*)\b",
        )
        .expect("valid regex")
    })
}

fn automation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(scripts?|scripting|pipelines?|automat\w*|workflows?|ci|cd|cron\w*|makefile|github actions)\b",
        )
        .expect("valid regex")
    })
}

fn classify(text: &str) -> Option<WorkType> {
    if !verb_regex().is_match(text) {
        return None;
    }
    Some(if automation_regex().is_match(text) {
        WorkType::AgentAutomation
    } else {
        WorkType::TechnicalConversation
    })
}

#[derive(Debug, Default)]
pub struct TechnicalWorkExtractor;

impl TechnicalWorkExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for TechnicalWorkExtractor {
    type Output = Vec<TechnicalWork>;

    fn name(&self) -> &'static str {
        "technical_work"
    }

    fn extract(
        &self,
        messages: &[Message],
        summary: Option<&ConversationSummary>,
    ) -> Result<Vec<TechnicalWork>> {
        if let Some(summary) = usable_summary(self.name(), summary)? {
            return Ok(assistant_turns(summary)
                .into_iter()
                .filter_map(|turn| {
                    let work_type = classify(turn.text)?;
                    let (message_index, timestamp) = locate(messages, turn.role, turn.ordinal);
                    Some(TechnicalWork {
                        timestamp,
                        work: turn.text.to_string(),
                        work_type,
                        source: Provenance::ConversationSummary,
                        message_index,
                    })
                })
                .collect());
        }

        Ok(messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::Assistant)
            .filter_map(|(i, m)| {
                Some(TechnicalWork {
                    timestamp: m.timestamp,
                    work: m.content.clone(),
                    work_type: classify(&m.content)?,
                    source: Provenance::IndividualMessage,
                    message_index: Some(i),
                })
            })
            .collect())
    }
}
