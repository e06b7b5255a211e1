//! Priority-based fact extraction
//!
//! Six independent extractors turn a conversation into typed facts. Each
//! one follows the same algorithm:
//!
//! 1. **Summary first**: with a non-empty [`ConversationSummary`], facts are
//!    read from the aggregated text and tagged
//!    [`Provenance::ConversationSummary`].
//! 2. **Messages otherwise**: each message is scanned on its own and facts
//!    are tagged [`Provenance::IndividualMessage`] with a lower default
//!    confidence.
//!
//! Fact text is always the complete source span. Nothing is cut to a width.
//!
//! An empty conversation yields empty output. Errors are reserved for
//! internal faults such as a summary whose metrics contradict its text.

mod action;
mod decision;
mod flow;
mod intent;
mod state;
mod technical;

pub use action::ActionExtractor;
pub use decision::DecisionExtractor;
pub use flow::FlowExtractor;
pub use intent::IntentExtractor;
pub use state::StateExtractor;
pub use technical::TechnicalWorkExtractor;

use crate::error::{Error, Result};
use crate::types::{ConversationSummary, Message, Role};
use chrono::{DateTime, Utc};

/// A deterministic, pattern-based extractor.
pub trait Extractor {
    /// What this extractor produces
    type Output;

    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Extract facts, preferring `summary` when it is non-empty.
    fn extract(
        &self,
        messages: &[Message],
        summary: Option<&ConversationSummary>,
    ) -> Result<Self::Output>;
}

/// Pick the summary for Priority 1, or `None` to fall back to messages.
///
/// A summary that counts messages but carries no transcript is corrupt and
/// reported as an extraction fault.
pub(crate) fn usable_summary<'a>(
    extractor: &str,
    summary: Option<&'a ConversationSummary>,
) -> Result<Option<&'a ConversationSummary>> {
    let Some(summary) = summary else {
        return Ok(None);
    };
    if summary.is_empty() {
        return Ok(None);
    }
    if summary.full_conversation.is_empty()
        && summary.user_queries.is_empty()
        && summary.ai_responses.is_empty()
    {
        return Err(Error::extraction(
            extractor,
            format!(
                "summary reports {} messages but has no text",
                summary.metrics.total_messages
            ),
        ));
    }
    Ok(Some(summary))
}

/// Find the `ordinal`-th (1-based) message with `role`, with its index.
pub(crate) fn nth_with_role(
    messages: &[Message],
    role: Role,
    ordinal: usize,
) -> Option<(usize, &Message)> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == role)
        .nth(ordinal.checked_sub(1)?)
}

/// Index and timestamp for a summary turn, when the messages line up.
pub(crate) fn locate(
    messages: &[Message],
    role: Option<Role>,
    ordinal: usize,
) -> (Option<usize>, Option<DateTime<Utc>>) {
    let found = match role {
        Some(role) => nth_with_role(messages, role, ordinal),
        None => ordinal
            .checked_sub(1)
            .and_then(|i| messages.get(i).map(|m| (i, m))),
    };
    match found {
        Some((index, message)) => (Some(index), message.timestamp),
        None => (None, None),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{Message, Role};
    use chrono::{TimeZone, Utc};

    /// Messages with increasing timestamps, one minute apart.
    pub fn conversation(turns: &[(Role, &str)]) -> Vec<Message> {
        turns
            .iter()
            .enumerate()
            .map(|(i, (role, content))| {
                let ts = Utc
                    .with_ymd_and_hms(2025, 1, 2, 3, i as u32, 0)
                    .single();
                Message::new("conv", *role, *content, ts)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::conversation;
    use super::*;
    use crate::summary::summarize;
    use crate::types::SummaryMetrics;

    #[test]
    fn test_usable_summary() {
        assert!(usable_summary("x", None).unwrap().is_none());
        let empty = ConversationSummary::default();
        assert!(usable_summary("x", Some(&empty)).unwrap().is_none());

        let messages = conversation(&[(Role::User, "hi")]);
        let summary = summarize(&messages);
        assert!(usable_summary("x", Some(&summary)).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_summary_is_extraction_error() {
        let corrupt = ConversationSummary {
            metrics: SummaryMetrics {
                total_messages: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = usable_summary("intent", Some(&corrupt)).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_locate() {
        let messages = conversation(&[
            (Role::User, "a"),
            (Role::Assistant, "b"),
            (Role::User, "c"),
        ]);
        let (index, ts) = locate(&messages, Some(Role::User), 2);
        assert_eq!(index, Some(2));
        assert_eq!(ts, messages[2].timestamp);
        assert_eq!(locate(&messages, None, 2).0, Some(1));
        assert_eq!(locate(&messages, Some(Role::User), 3), (None, None));
        assert_eq!(locate(&messages, None, 0), (None, None));
    }
}
