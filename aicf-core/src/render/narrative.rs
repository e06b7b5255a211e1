//! Narrative markdown artifact
//!
//! Human-facing: one `## Chat <id> - <date> - <title>` block per
//! conversation, followed by prose sections. Nothing here is meant to be
//! parsed back except the chat headings, which [`dedupe_log`] relies on.

use crate::types::AnalysisResult;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Heading that opens one conversation block.
fn chat_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^## Chat (\S+) - (\d{4}-\d{2}-\d{2}) - (.+)$").expect("valid regex")
    })
}

/// Render a narrative block for one analysis result.
///
/// `title_len` bounds the heading title only; every fact appears in full in
/// the body.
pub fn render(result: &AnalysisResult, title_len: usize) -> String {
    let mut out = String::new();
    let date = result.updated_at.format("%Y-%m-%d");
    let metrics = &result.summary.metrics;

    let _ = writeln!(
        out,
        "## Chat {} - {} - {}",
        result.conversation_id,
        date,
        title(result, title_len)
    );
    out.push('\n');
    let _ = writeln!(
        out,
        "**Source:** {} | **Messages:** {} ({} user, {} assistant) | **Turns:** {} | **Dominant:** {}",
        result.source.display_name(),
        metrics.total_messages,
        metrics.user_messages,
        metrics.ai_messages,
        result.flow.turns,
        result.flow.dominant_role.as_str(),
    );

    if !result.intents.is_empty() {
        out.push_str("\n### What was asked\n\n");
        for intent in &result.intents {
            bullet(&mut out, &intent.intent);
        }
    }

    if !result.actions.is_empty() {
        out.push_str("\n### What the assistant did\n\n");
        for action in &result.actions {
            bullet(
                &mut out,
                &format!("({}) {}", action.action_type.as_str(), action.details),
            );
        }
    }

    if !result.technical_work.is_empty() {
        out.push_str("\n### Technical work\n\n");
        for work in &result.technical_work {
            bullet(&mut out, &format!("({}) {}", work.work_type.as_str(), work.work));
        }
    }

    if !result.decisions.is_empty() {
        out.push_str("\n### Decisions\n\n");
        for decision in &result.decisions {
            bullet(
                &mut out,
                &format!("**{}** {}", decision.impact.as_str(), decision.decision),
            );
        }
    }

    let state = &result.state;
    out.push_str("\n### Current state\n\n");
    if !state.current_task.is_empty() {
        bullet(&mut out, &format!("**Task:** {}", state.current_task));
    }
    for blocker in &state.blockers {
        bullet(&mut out, &format!("**Blocked:** {blocker}"));
    }
    if !state.next_action.is_empty() {
        bullet(&mut out, &format!("**Next:** {}", state.next_action));
    }
    let _ = writeln!(
        out,
        "- **Updated:** {}",
        state.last_update.format("%Y-%m-%d %H:%M UTC")
    );

    out
}

/// Heading title: first line of the first intent, else a generic label.
fn title(result: &AnalysisResult, max_chars: usize) -> String {
    let first_line = result
        .intents
        .first()
        .and_then(|i| i.intent.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("Conversation");
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    let mut shortened: String = first_line.chars().take(max_chars.saturating_sub(3)).collect();
    shortened.push_str("...");
    shortened
}

/// Markdown bullet; continuation lines are indented under it.
fn bullet(out: &mut String, text: &str) {
    let mut lines = text.lines();
    let _ = writeln!(out, "- {}", lines.next().unwrap_or_default());
    for line in lines {
        if line.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, "  {line}");
        }
    }
}

// ============================================
// Log deduplication
// ============================================

/// Counts reported by [`dedupe_log`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeStats {
    pub original_lines: usize,
    pub final_lines: usize,
    pub removed_lines: usize,
    /// Distinct `(id, date)` conversations kept
    pub conversations: usize,
    /// `id (date)` of every removed block, in order
    pub removed: Vec<String>,
}

/// Drop repeated chat blocks from a narrative log.
///
/// Blocks are keyed by `(id, date)` from their `## Chat` heading; the first
/// occurrence is kept. A skipped block ends at the next `## ` heading.
pub fn dedupe_log(content: &str) -> (String, DedupeStats) {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(lines.len());
    let mut removed = Vec::new();
    let mut skipping = false;

    for line in &lines {
        if let Some(caps) = chat_heading_regex().captures(line) {
            let key = format!("{}-{}", &caps[1], &caps[2]);
            if seen.contains(&key) {
                tracing::debug!(conversation = &caps[1], date = &caps[2], "Dropping repeated chat block");
                removed.push(format!("{} ({})", &caps[1], &caps[2]));
                skipping = true;
                continue;
            }
            seen.insert(key);
            skipping = false;
        } else if skipping && line.starts_with("## ") {
            skipping = false;
        }
        if !skipping {
            kept.push(*line);
        }
    }

    let stats = DedupeStats {
        original_lines: lines.len(),
        final_lines: kept.len(),
        removed_lines: lines.len() - kept.len(),
        conversations: seen.len(),
        removed,
    };
    (kept.join("\n"), stats)
}

/// Whether `text` has at least one markdown heading.
pub fn has_heading(text: &str) -> bool {
    text.lines().any(|line| {
        let hashes = line.chars().take_while(|c| *c == '#').count();
        (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ConversationOrchestrator;
    use crate::types::{Conversation, Message, Role, SourcePlatform};
    use chrono::{TimeZone, Utc};

    fn analysis(contents: &[(Role, &str)]) -> AnalysisResult {
        let ts = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).single();
        let messages = contents
            .iter()
            .map(|(role, content)| Message::new("abc123", *role, *content, ts))
            .collect();
        let conversation = Conversation::from_messages("abc123", SourcePlatform::Augment, messages);
        ConversationOrchestrator::new()
            .analyze_conversation(&conversation)
            .unwrap()
    }

    #[test]
    fn test_render_heading_and_full_facts() {
        let long = format!("How do I implement {}?", "a very long parser ".repeat(10));
        let result = analysis(&[
            (Role::User, &long),
            (Role::Assistant, "Here is how you implement it.\nStep two."),
        ]);
        let text = render(&result, 40);

        let heading = text.lines().next().unwrap();
        assert!(heading.starts_with("## Chat abc123 - 2025-03-04 - How do I implement"));
        assert!(heading.ends_with("..."));
        assert!(chat_heading_regex().is_match(heading));
        assert!(text.contains(&long));
        assert!(text.contains("  Step two."));
        assert!(text.contains("**Next:** Test the implementation"));
        assert!(has_heading(&text));
    }

    #[test]
    fn test_render_empty_conversation() {
        let text = render(&analysis(&[]), 60);
        assert!(text.starts_with("## Chat abc123 - "));
        assert!(text.contains(" - Conversation\n"));
    }

    #[test]
    fn test_dedupe_keeps_first_block() {
        let log = "# Log\n\
            ## Chat aa11 - 2025-01-01 - First\n\
            new body\n\
            ## Chat bb22 - 2025-01-01 - Other\n\
            other body\n\
            ## Chat aa11 - 2025-01-01 - First\n\
            old body\n\
            more old\n\
            ## Notes\n\
            kept";
        let (out, stats) = dedupe_log(log);

        assert!(out.contains("new body"));
        assert!(!out.contains("old body"));
        assert!(out.contains("## Notes\nkept"));
        assert_eq!(stats.conversations, 2);
        assert_eq!(stats.original_lines, 10);
        assert_eq!(stats.removed_lines, 3);
        assert_eq!(stats.final_lines, 7);
        assert_eq!(stats.removed, vec!["aa11 (2025-01-01)"]);
    }

    #[test]
    fn test_dedupe_same_id_different_date_kept() {
        let log = "## Chat aa - 2025-01-01 - A\nx\n## Chat aa - 2025-01-02 - A\ny";
        let (out, stats) = dedupe_log(log);
        assert_eq!(out, log);
        assert_eq!(stats.conversations, 2);
    }

    #[test]
    fn test_has_heading() {
        assert!(has_heading("text\n### Heading"));
        assert!(!has_heading("#hashtag\nplain"));
        assert!(!has_heading(""));
    }
}
