//! User intent extraction: one fact per user turn.

use super::{locate, usable_summary, Extractor};
use crate::error::Result;
use crate::summary::user_turns;
use crate::types::{Confidence, ConversationSummary, Message, Provenance, Role, UserIntent};

#[derive(Debug, Default)]
pub struct IntentExtractor;

impl IntentExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for IntentExtractor {
    type Output = Vec<UserIntent>;

    fn name(&self) -> &'static str {
        "intent"
    }

    fn extract(
        &self,
        messages: &[Message],
        summary: Option<&ConversationSummary>,
    ) -> Result<Vec<UserIntent>> {
        if let Some(summary) = usable_summary(self.name(), summary)? {
            return Ok(user_turns(summary)
                .into_iter()
                .filter(|turn| !turn.text.trim().is_empty())
                .map(|turn| {
                    let (message_index, timestamp) = locate(messages, turn.role, turn.ordinal);
                    UserIntent {
                        timestamp,
                        intent: turn.text.to_string(),
                        inferred_from: Provenance::ConversationSummary,
                        confidence: Confidence::High,
                        message_index,
                    }
                })
                .collect());
        }

        Ok(messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User && !m.content.trim().is_empty())
            .map(|(i, m)| UserIntent {
                timestamp: m.timestamp,
                intent: m.content.clone(),
                inferred_from: Provenance::IndividualMessage,
                confidence: Confidence::Medium,
                message_index: Some(i),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::conversation;
    use crate::summary::summarize;

    #[test]
    fn test_one_fact_per_user_turn() {
        let messages = conversation(&[
            (Role::User, "How do I implement a parser?"),
            (Role::Assistant, "Like this."),
            (Role::User, "And tests?"),
        ]);
        let summary = summarize(&messages);
        let intents = IntentExtractor::new()
            .extract(&messages, Some(&summary))
            .unwrap();

        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].intent, "How do I implement a parser?");
        assert_eq!(intents[0].inferred_from, Provenance::ConversationSummary);
        assert_eq!(intents[0].confidence, Confidence::High);
        assert_eq!(intents[1].message_index, Some(2));
        assert_eq!(intents[1].timestamp, messages[2].timestamp);
    }

    #[test]
    fn test_pasted_summary_text_stays_in_its_turn() {
        let messages = conversation(&[
            (Role::User, "Earlier summary:\n\n[U2] old question"),
            (Role::Assistant, "ok"),
            (Role::User, "new question"),
        ]);
        let summary = summarize(&messages);
        let intents = IntentExtractor::new()
            .extract(&messages, Some(&summary))
            .unwrap();

        let texts: Vec<_> = intents.iter().map(|i| i.intent.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Earlier summary:\n\n[U2] old question", "new question"]
        );
        assert_eq!(intents[1].message_index, Some(2));
    }

    #[test]
    fn test_message_fallback() {
        let messages = conversation(&[(Role::User, "just messages")]);
        let intents = IntentExtractor::new().extract(&messages, None).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].inferred_from, Provenance::IndividualMessage);
        assert_eq!(intents[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_empty() {
        assert!(IntentExtractor::new().extract(&[], None).unwrap().is_empty());
    }
}
