//! Conversation flow: message categories, turn count and dominant role.
//!
//! Works on raw messages only; the summary is ignored.

use super::Extractor;
use crate::error::Result;
use crate::types::{ConversationFlow, ConversationSummary, DominantRole, Message, Role};

/// Messages at least this many characters long are tagged `long`.
pub const LONG_MESSAGE_CHARS: usize = 100;

/// Relative imbalance above which one side dominates.
const DOMINANCE_SKEW: f64 = 0.3;

#[derive(Debug, Default)]
pub struct FlowExtractor;

impl FlowExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for FlowExtractor {
    type Output = ConversationFlow;

    fn name(&self) -> &'static str {
        "flow"
    }

    fn extract(
        &self,
        messages: &[Message],
        _summary: Option<&ConversationSummary>,
    ) -> Result<ConversationFlow> {
        let sequence = messages
            .iter()
            .map(|m| {
                let size = if m.content.chars().count() >= LONG_MESSAGE_CHARS {
                    "long"
                } else {
                    "short"
                };
                format!("{}_{}", m.role, size)
            })
            .collect();

        // A turn starts when the user speaks first or after the assistant
        let mut turns = 0;
        let mut previous: Option<Role> = None;
        for message in messages.iter().filter(|m| m.role != Role::System) {
            if message.role == Role::User && previous != Some(Role::User) {
                turns += 1;
            }
            previous = Some(message.role);
        }

        let users = messages.iter().filter(|m| m.role == Role::User).count();
        let assistants = messages.iter().filter(|m| m.role == Role::Assistant).count();

        Ok(ConversationFlow {
            sequence,
            turns,
            dominant_role: dominant_role(users, assistants),
        })
    }
}

fn dominant_role(users: usize, assistants: usize) -> DominantRole {
    let total = users + assistants;
    if total == 0 {
        return DominantRole::Balanced;
    }
    let skew = users.abs_diff(assistants) as f64 / total as f64;
    if skew <= DOMINANCE_SKEW {
        DominantRole::Balanced
    } else if users > assistants {
        DominantRole::User
    } else {
        DominantRole::Assistant
    }
}
