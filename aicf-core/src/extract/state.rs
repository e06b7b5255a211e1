//! Working state: current task, blockers and the next action.

use super::{usable_summary, Extractor};
use crate::error::Result;
use crate::summary::{transcript_turns, user_turns};
use crate::types::{ConversationSummary, Message, Role, WorkingState};
use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

fn current_task_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:currently|now)\s+(?:working\s+on|implementing|fixing|building|focusing\s+on)\s+([^.!?\n]+)")
            .expect("valid regex")
    })
}

fn blocker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:blocked\s+(?:by|on)|cannot|can't|can\s+not|unable\s+to|need\s+to)\s+[^.!?\n]+")
            .expect("valid regex")
    })
}

fn next_action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:next(?:\s+step)?(?:\s+is)?|then|todo|plan\s+to)\b:?\s+([^.!?\n]+)")
            .expect("valid regex")
    })
}

/// Default next action keyed by what the conversation was about.
const NEXT_ACTION_HEURISTICS: &[(&str, &str)] = &[
    ("implement", "Test the implementation"),
    ("fix", "Verify the fix"),
    ("bug", "Verify the fix"),
    ("refactor", "Run the test suite against the refactor"),
    ("test", "Review the test results"),
    ("deploy", "Monitor the deployment"),
    ("design", "Start the implementation"),
];

const DEFAULT_NEXT_ACTION: &str = "Continue the conversation";

#[derive(Debug, Default)]
pub struct StateExtractor;

impl StateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for StateExtractor {
    type Output = WorkingState;

    fn name(&self) -> &'static str {
        "state"
    }

    fn extract(
        &self,
        messages: &[Message],
        summary: Option<&ConversationSummary>,
    ) -> Result<WorkingState> {
        let (texts, last_user): (Vec<&str>, Option<&str>) =
            match usable_summary(self.name(), summary)? {
                Some(summary) => (
                    transcript_turns(summary).into_iter().map(|t| t.text).collect(),
                    user_turns(summary).last().map(|t| t.text),
                ),
                None => (
                    messages.iter().map(|m| m.content.as_str()).collect(),
                    messages
                        .iter()
                        .rev()
                        .find(|m| m.role == Role::User)
                        .map(|m| m.content.as_str()),
                ),
            };

        let last_update = messages
            .iter()
            .filter_map(|m| m.timestamp)
            .max()
            .unwrap_or_else(Utc::now);

        if texts.is_empty() {
            return Ok(WorkingState {
                current_task: String::new(),
                blockers: Vec::new(),
                next_action: String::new(),
                last_update,
            });
        }

        let current_task = texts
            .iter()
            .flat_map(|t| current_task_regex().captures_iter(t))
            .last()
            .map(|caps| caps[1].trim().to_string())
            .or_else(|| last_user.map(|t| t.trim().to_string()))
            .unwrap_or_default();

        let mut blockers: Vec<String> = Vec::new();
        for found in texts.iter().flat_map(|t| blocker_regex().find_iter(t)) {
            let blocker = found.as_str().trim().to_string();
            if !blockers.contains(&blocker) {
                blockers.push(blocker);
            }
        }

        let next_action = texts
            .iter()
            .flat_map(|t| next_action_regex().captures_iter(t))
            .last()
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_else(|| heuristic_next_action(&texts).to_string());

        Ok(WorkingState {
            current_task,
            blockers,
            next_action,
            last_update,
        })
    }
}

fn heuristic_next_action(texts: &[&str]) -> &'static str {
    let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
    NEXT_ACTION_HEURISTICS
        .iter()
        .find(|(keyword, _)| lowered.iter().any(|t| t.contains(keyword)))
        .map(|(_, action)| *action)
        .unwrap_or(DEFAULT_NEXT_ACTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::conversation;
    use crate::summary::summarize;

    #[test]
    fn test_explicit_patterns() {
        let messages = conversation(&[
            (Role::User, "I'm currently working on the cache layer. We need to add eviction."),
            (
                Role::Assistant,
                "Blocked by the flaky disk test. We need to add eviction. Next step: write the LRU policy.",
            ),
        ]);
        let summary = summarize(&messages);
        let state = StateExtractor::new()
            .extract(&messages, Some(&summary))
            .unwrap();

        assert_eq!(state.current_task, "the cache layer");
        assert_eq!(
            state.blockers,
            vec!["need to add eviction", "Blocked by the flaky disk test"]
        );
        assert_eq!(state.next_action, "write the LRU policy");
        assert_eq!(state.last_update, messages[1].timestamp.unwrap());
    }

    #[test]
    fn test_heuristic_fallbacks() {
        let messages = conversation(&[
            (Role::User, "How do I implement a parser?"),
            (Role::Assistant, "Here is how you implement a parser."),
        ]);
        let state = StateExtractor::new().extract(&messages, None).unwrap();
        assert_eq!(state.current_task, "How do I implement a parser?");
        assert!(state.blockers.is_empty());
        assert_eq!(state.next_action, "Test the implementation");
    }

    #[test]
    fn test_default_next_action() {
        let messages = conversation(&[(Role::User, "Hello")]);
        let state = StateExtractor::new().extract(&messages, None).unwrap();
        assert_eq!(state.next_action, DEFAULT_NEXT_ACTION);
    }

    #[test]
    fn test_empty() {
        let state = StateExtractor::new().extract(&[], None).unwrap();
        assert!(state.current_task.is_empty());
        assert!(state.next_action.is_empty());
    }
}
