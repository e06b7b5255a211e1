//! Lossless conversation summarizer
//!
//! Folds a message list into a [`ConversationSummary`]. Every message's
//! content is copied whole, tagged with its role and ordinal position:
//!
//! ```text
//! user_queries:       [U1] How do I ...\n\n[U2] And then ...
//! ai_responses:       [A1] Here is ...\n\n[A2] ...
//! full_conversation:  [1] user: How do I ...\n\n[2] assistant: Here is ...
//! ```
//!
//! Extractors split the aggregated text back into turns with [`user_turns`],
//! [`assistant_turns`] and [`transcript_turns`]. A summary built here records
//! where every body starts and ends, so marker-like text pasted into a
//! message never moves a turn boundary. Summaries from elsewhere fall back to
//! splitting on the ordinal markers.

use crate::types::{ConversationSummary, Message, Role, SummaryMetrics, TurnLayout};
use std::ops::Range;

const SEPARATOR: &str = "\n\n";
const USER_TAG: &str = "U";
const ASSISTANT_TAG: &str = "A";

/// Aggregate messages into a summary. Pure and total.
pub fn summarize(messages: &[Message]) -> ConversationSummary {
    let mut user = Joined::default();
    let mut assistant = Joined::default();
    let mut full = Joined::default();
    let mut metrics = SummaryMetrics {
        total_messages: messages.len(),
        ..Default::default()
    };

    for (i, message) in messages.iter().enumerate() {
        metrics.total_characters += message.content.chars().count();
        match message.role {
            Role::User => {
                metrics.user_messages += 1;
                user.push(&marker(USER_TAG, metrics.user_messages), &message.content);
            }
            Role::Assistant => {
                metrics.ai_messages += 1;
                assistant.push(
                    &marker(ASSISTANT_TAG, metrics.ai_messages),
                    &message.content,
                );
            }
            Role::System => {}
        }
        full.push(
            &marker("", i + 1),
            &format!("{}: {}", message.role, message.content),
        );
    }

    ConversationSummary {
        user_queries: user.text,
        ai_responses: assistant.text,
        full_conversation: full.text,
        metrics,
        layout: TurnLayout {
            user: user.bodies,
            assistant: assistant.bodies,
            transcript: full.bodies,
        },
    }
}

fn marker(tag: &str, ordinal: usize) -> String {
    format!("[{tag}{ordinal}] ")
}

/// Marked turns joined by [`SEPARATOR`], with each body's byte range.
#[derive(Default)]
struct Joined {
    text: String,
    bodies: Vec<Range<usize>>,
}

impl Joined {
    fn push(&mut self, marker: &str, body: &str) {
        if !self.text.is_empty() {
            self.text.push_str(SEPARATOR);
        }
        self.text.push_str(marker);
        let start = self.text.len();
        self.text.push_str(body);
        self.bodies.push(start..self.text.len());
    }
}

/// One turn recovered from aggregated summary text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn<'a> {
    /// 1-based position among turns of the same kind
    pub ordinal: usize,
    pub role: Option<Role>,
    pub text: &'a str,
}

/// Split `user_queries` back into user turns.
pub fn user_turns(summary: &ConversationSummary) -> Vec<Turn<'_>> {
    turn_bodies(
        &summary.user_queries,
        &summary.layout.user,
        USER_TAG,
        summary.metrics.user_messages,
    )
    .into_iter()
    .map(|(ordinal, text)| Turn {
        ordinal,
        role: Some(Role::User),
        text,
    })
    .collect()
}

/// Split `ai_responses` back into assistant turns.
pub fn assistant_turns(summary: &ConversationSummary) -> Vec<Turn<'_>> {
    turn_bodies(
        &summary.ai_responses,
        &summary.layout.assistant,
        ASSISTANT_TAG,
        summary.metrics.ai_messages,
    )
    .into_iter()
    .map(|(ordinal, text)| Turn {
        ordinal,
        role: Some(Role::Assistant),
        text,
    })
    .collect()
}

/// Split `full_conversation` back into role-tagged turns.
///
/// `role` is `None` when a turn carries no `role: ` prefix (hand-built text).
pub fn transcript_turns(summary: &ConversationSummary) -> Vec<Turn<'_>> {
    turn_bodies(
        &summary.full_conversation,
        &summary.layout.transcript,
        "",
        summary.metrics.total_messages,
    )
    .into_iter()
    .map(|(ordinal, body)| {
        match body
            .split_once(": ")
            .and_then(|(label, rest)| label.parse::<Role>().ok().map(|r| (r, rest)))
        {
            Some((role, text)) => Turn {
                ordinal,
                role: Some(role),
                text,
            },
            None => Turn {
                ordinal,
                role: None,
                text: body,
            },
        }
    })
    .collect()
}

/// Turn bodies from the recorded layout, or from the markers when the layout
/// is missing or does not fit the text.
fn turn_bodies<'a>(
    text: &'a str,
    layout: &[Range<usize>],
    tag: &str,
    expected: usize,
) -> Vec<(usize, &'a str)> {
    if expected > 0 && layout.len() == expected {
        let recorded: Option<Vec<_>> = layout
            .iter()
            .enumerate()
            .map(|(i, range)| {
                let ordinal = i + 1;
                let head = text.get(..range.start)?;
                if !head.ends_with(marker(tag, ordinal).as_str()) {
                    return None;
                }
                text.get(range.clone()).map(|body| (ordinal, body))
            })
            .collect();
        if let Some(turns) = recorded {
            return turns;
        }
    }
    split_marked(text, tag, expected)
}

/// Recover `(ordinal, body)` pairs from `[{tag}1] a\n\n[{tag}2] b` text.
///
/// Markers must appear in sequence, so marker-like text inside a message body
/// only splits when it names the next ordinal. Once `expected` turns are
/// found the remainder belongs to the last one. Text without a leading
/// marker is returned whole as turn 1.
fn split_marked<'a>(text: &'a str, tag: &str, expected: usize) -> Vec<(usize, &'a str)> {
    if text.is_empty() {
        return Vec::new();
    }
    let first = marker(tag, 1);
    let Some(mut rest) = text.strip_prefix(first.as_str()) else {
        return vec![(1, text)];
    };

    let mut turns = Vec::new();
    let mut ordinal = 1;
    loop {
        let next = format!("{SEPARATOR}{}", marker(tag, ordinal + 1));
        let boundary = if expected == 0 || ordinal < expected {
            rest.find(next.as_str())
        } else {
            None
        };
        match boundary {
            Some(at) => {
                turns.push((ordinal, &rest[..at]));
                rest = &rest[at + next.len()..];
                ordinal += 1;
            }
            None => {
                turns.push((ordinal, rest));
                break;
            }
        }
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> Message {
        Message::new("c", role, content, None)
    }

    #[test]
    fn test_empty_input() {
        let summary = summarize(&[]);
        assert!(summary.is_empty());
        assert!(summary.user_queries.is_empty());
        assert!(summary.full_conversation.is_empty());
        assert_eq!(summary.metrics, SummaryMetrics::default());
        assert!(user_turns(&summary).is_empty());
    }

    #[test]
    fn test_metrics_and_layout() {
        let messages = vec![
            msg(Role::User, "How?"),
            msg(Role::Assistant, "Like this."),
            msg(Role::System, "note"),
        ];
        let summary = summarize(&messages);
        assert_eq!(summary.metrics.total_messages, 3);
        assert_eq!(summary.metrics.user_messages, 1);
        assert_eq!(summary.metrics.ai_messages, 1);
        assert_eq!(summary.metrics.total_characters, 4 + 10 + 4);
        assert_eq!(summary.user_queries, "[U1] How?");
        assert_eq!(summary.ai_responses, "[A1] Like this.");
        assert_eq!(
            summary.full_conversation,
            "[1] user: How?\n\n[2] assistant: Like this.\n\n[3] system: note"
        );
    }

    #[test]
    fn test_lossless_for_long_and_multiline_content() {
        let long = "word ".repeat(2_000);
        let messages = vec![
            msg(Role::User, &long),
            msg(Role::Assistant, "line one\n\nline two\n\n[A9] not a marker"),
            msg(Role::User, "ünïcödé ✓"),
        ];
        let summary = summarize(&messages);

        assert_eq!(summary.metrics.total_messages, messages.len());
        for m in &messages {
            assert!(summary.full_conversation.contains(&m.content));
        }

        let users = user_turns(&summary);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].text, long);
        assert_eq!(users[1].text, "ünïcödé ✓");

        let assistants = assistant_turns(&summary);
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].text, messages[1].content);
    }

    #[test]
    fn test_marker_text_inside_body_does_not_split_past_expected() {
        let messages = vec![msg(Role::User, "quote:\n\n[U2] fake")];
        let summary = summarize(&messages);
        let turns = user_turns(&summary);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "quote:\n\n[U2] fake");
    }

    #[test]
    fn test_next_marker_inside_earlier_body_keeps_turns_whole() {
        let messages = vec![
            msg(Role::User, "Earlier summary:\n\n[U2] old question"),
            msg(Role::Assistant, "ok\n\n[A2] stale answer"),
            msg(Role::User, "new question"),
            msg(Role::Assistant, "fine"),
        ];
        let summary = summarize(&messages);

        let users: Vec<_> = user_turns(&summary).iter().map(|t| t.text).collect();
        assert_eq!(
            users,
            vec!["Earlier summary:\n\n[U2] old question", "new question"]
        );
        let assistants: Vec<_> = assistant_turns(&summary).iter().map(|t| t.text).collect();
        assert_eq!(assistants, vec!["ok\n\n[A2] stale answer", "fine"]);

        let transcript = transcript_turns(&summary);
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0].text, messages[0].content);
        assert_eq!(transcript[2].role, Some(Role::User));
        assert_eq!(transcript[2].text, "new question");
    }

    #[test]
    fn test_layout_that_does_not_fit_falls_back_to_markers() {
        let mut summary = summarize(&[msg(Role::User, "one"), msg(Role::User, "two")]);
        summary.user_queries = "[U1] first\n\n[U2] second".to_string();
        let users: Vec<_> = user_turns(&summary).iter().map(|t| t.text).collect();
        assert_eq!(users, vec!["first", "second"]);
    }

    #[test]
    fn test_transcript_turns_recover_roles() {
        let messages = vec![
            msg(Role::User, "a: b"),
            msg(Role::Assistant, "done"),
        ];
        let summary = summarize(&messages);
        let turns = transcript_turns(&summary);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Some(Role::User));
        assert_eq!(turns[0].text, "a: b");
        assert_eq!(turns[1].role, Some(Role::Assistant));
        assert_eq!(turns[1].ordinal, 2);
    }

    #[test]
    fn test_unmarked_text_is_one_turn() {
        let summary = ConversationSummary {
            user_queries: "free text".to_string(),
            ..Default::default()
        };
        let turns = user_turns(&summary);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].ordinal, 1);
        assert_eq!(turns[0].text, "free text");
    }
}
