//! Assistant action extraction: one fact per assistant turn.

use super::{locate, usable_summary, Extractor};
use crate::error::Result;
use crate::summary::assistant_turns;
use crate::types::{ActionType, AiAction, ConversationSummary, Message, Provenance, Role};

const CODE_FENCE: &str = "```";

#[derive(Debug, Default)]
pub struct ActionExtractor;

impl ActionExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn classify(text: &str) -> ActionType {
    if text.contains(CODE_FENCE) {
        ActionType::AgentAction
    } else {
        ActionType::AiResponse
    }
}

impl Extractor for ActionExtractor {
    type Output = Vec<AiAction>;

    fn name(&self) -> &'static str {
        "action"
    }

    fn extract(
        &self,
        messages: &[Message],
        summary: Option<&ConversationSummary>,
    ) -> Result<Vec<AiAction>> {
        if let Some(summary) = usable_summary(self.name(), summary)? {
            return Ok(assistant_turns(summary)
                .into_iter()
                .filter(|turn| !turn.text.trim().is_empty())
                .map(|turn| {
                    let (message_index, timestamp) = locate(messages, turn.role, turn.ordinal);
                    AiAction {
                        timestamp,
                        action_type: classify(turn.text),
                        details: turn.text.to_string(),
                        source: Provenance::ConversationSummary,
                        message_index,
                    }
                })
                .collect());
        }

        Ok(messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::Assistant && !m.content.trim().is_empty())
            .map(|(i, m)| AiAction {
                timestamp: m.timestamp,
                action_type: classify(&m.content),
                details: m.content.clone(),
                source: Provenance::IndividualMessage,
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
    fn test_classification() {
        let messages = conversation(&[
            (Role::User, "q"),
            (Role::Assistant, "Here is how you implement a parser with TypeScript."),
            (Role::Assistant, "Run:\n```sh\ncargo test\n```"),
        ]);
        let summary = summarize(&messages);
        let actions = ActionExtractor::new()
            .extract(&messages, Some(&summary))
            .unwrap();

        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0].details,
            "Here is how you implement a parser with TypeScript."
        );
        assert_eq!(actions[0].action_type, ActionType::AiResponse);
        assert_eq!(actions[1].action_type, ActionType::AgentAction);
        assert_eq!(actions[1].message_index, Some(2));
    }

    #[test]
    fn test_message_fallback_keeps_full_text() {
        let long = format!("{}```\ncode\n```", "explanation ".repeat(40));
        let messages = conversation(&[(Role::Assistant, &long)]);
        let actions = ActionExtractor::new().extract(&messages, None).unwrap();
        assert_eq!(actions[0].details, long);
        assert_eq!(actions[0].source, Provenance::IndividualMessage);
        assert_eq!(actions[0].action_type, ActionType::AgentAction);
    }
}
