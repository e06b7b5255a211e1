//! Conversation orchestrator
//!
//! Sequences parsing, summarizing and the six extractors into one
//! [`AnalysisResult`]. Extractors are independent of each other; the first
//! one to fail aborts the analysis so no fact category is silently dropped.

use crate::error::{Error, Result};
use crate::extract::{
    ActionExtractor, DecisionExtractor, Extractor, FlowExtractor, IntentExtractor,
    StateExtractor, TechnicalWorkExtractor,
};
use crate::parse::parse_payload;
use crate::summary::summarize;
use crate::types::{
    AnalysisResult, Checkpoint, Conversation, ConversationSummary, Message, SourcePlatform,
};
use chrono::Utc;

/// Runs the full analysis for one conversation.
#[derive(Debug, Default)]
pub struct ConversationOrchestrator {
    intent: IntentExtractor,
    action: ActionExtractor,
    technical: TechnicalWorkExtractor,
    decision: DecisionExtractor,
    flow: FlowExtractor,
    state: StateExtractor,
}

impl ConversationOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze a checkpoint.
    ///
    /// Messages already present in the checkpoint are used as-is. Otherwise
    /// `rawData` is parsed with the parser for the checkpoint's source.
    pub fn analyze(&self, checkpoint: &Checkpoint) -> Result<AnalysisResult> {
        let conversation = resolve_conversation(checkpoint)?;
        self.analyze_conversation(&conversation)
    }

    /// Analyze an already-parsed conversation.
    pub fn analyze_conversation(&self, conversation: &Conversation) -> Result<AnalysisResult> {
        let messages = &conversation.messages;
        let summary = summarize(messages);

        tracing::debug!(
            conversation = %conversation.id,
            messages = summary.metrics.total_messages,
            characters = summary.metrics.total_characters,
            "Running extractors"
        );

        let intents = run(&self.intent, messages, &summary)?;
        let actions = run(&self.action, messages, &summary)?;
        let technical_work = run(&self.technical, messages, &summary)?;
        let decisions = run(&self.decision, messages, &summary)?;
        let flow = run(&self.flow, messages, &summary)?;
        let state = run(&self.state, messages, &summary)?;

        tracing::info!(
            conversation = %conversation.id,
            intents = intents.len(),
            actions = actions.len(),
            technical = technical_work.len(),
            decisions = decisions.len(),
            turns = flow.turns,
            "Analyzed conversation"
        );

        Ok(AnalysisResult {
            conversation_id: conversation.id.clone(),
            source: conversation.source,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            analyzed_at: Utc::now(),
            summary,
            intents,
            actions,
            technical_work,
            decisions,
            flow,
            state,
        })
    }
}

fn run<E: Extractor>(
    extractor: &E,
    messages: &[Message],
    summary: &ConversationSummary,
) -> Result<E::Output> {
    extractor.extract(messages, Some(summary)).map_err(|e| match e {
        Error::Extraction { .. } => e,
        other => Error::extraction(extractor.name(), other.to_string()),
    })
}

/// Build the conversation to analyze from a checkpoint.
///
/// Message conversation ids are normalized to the checkpoint's conversation
/// and missing ids are filled with content digests.
pub fn resolve_conversation(checkpoint: &Checkpoint) -> Result<Conversation> {
    let mut conversation = checkpoint.conversation.clone();
    if conversation.id.trim().is_empty() {
        return Err(Error::parsing(
            checkpoint.source.as_str(),
            "checkpoint conversation has no id",
        ));
    }

    if conversation.messages.is_empty() {
        if let Some(raw) = checkpoint.raw_data.as_deref() {
            conversation.messages = parse_payload(checkpoint.source, raw, &conversation.id)?;
        }
    }
    if conversation.source == SourcePlatform::Unknown {
        conversation.source = checkpoint.source;
    }

    for message in &mut conversation.messages {
        if message.conversation_id != conversation.id {
            message.conversation_id = conversation.id.clone();
        }
        if message.id.is_empty() {
            message.id = Message::digest_id(
                &message.conversation_id,
                message.role,
                message.timestamp,
                &message.content,
            );
        }
    }

    Ok(conversation)
}
