//! Structured AICF artifact
//!
//! A line-oriented format built for re-parsing. Sections start with `@NAME`
//! (optionally `@NAME:label`); each following line is `key=value` with a
//! snake_case key. Values are escaped so they never contain a space, a raw
//! pipe or a line break:
//!
//! | Character | Escaped |
//! |-----------|---------|
//! | `\`       | `\\`    |
//! | `_`       | `\_`    |
//! | space     | `_`     |
//! | `\|`      | `\|`    |
//! | newline   | `\n`    |
//! | CR        | `\r`    |
//!
//! Sequences and fact records are pipe-delimited. An empty value is an empty
//! sequence.
//!
//! ```text
//! @AICF
//! version=3.0
//! generated_at=2025-01-02T03:04:05+00:00
//!
//! @CONVERSATION:conv-1
//! source=augment
//! ...
//! @FLOW
//! sequence=user_short|assistant_long
//! ```

use crate::error::{Error, Result};
use crate::types::AnalysisResult;
use chrono::{DateTime, Utc};

/// Format version written to the `@AICF` header.
pub const FORMAT_VERSION: &str = "3.0";

pub const SECTION_HEADER: &str = "AICF";
pub const SECTION_CONVERSATION: &str = "CONVERSATION";
pub const SECTION_FLOW: &str = "FLOW";
pub const SECTION_DETAILS: &str = "DETAILS";
pub const SECTION_INSIGHTS: &str = "INSIGHTS";
pub const SECTION_DECISIONS: &str = "DECISIONS";
pub const SECTION_STATE: &str = "STATE";

/// Sections every artifact carries, in output order.
pub const REQUIRED_SECTIONS: &[&str] = &[
    SECTION_HEADER,
    SECTION_CONVERSATION,
    SECTION_FLOW,
    SECTION_DETAILS,
    SECTION_INSIGHTS,
    SECTION_DECISIONS,
    SECTION_STATE,
];

// ============================================
// Rendering
// ============================================

/// Render an analysis result as a structured artifact.
///
/// Deterministic: the same result always renders to the same text.
pub fn render(result: &AnalysisResult) -> String {
    let mut doc = Writer::default();

    doc.section(SECTION_HEADER, None);
    doc.field("version", FORMAT_VERSION);
    doc.field("generated_at", &result.analyzed_at.to_rfc3339());

    let metrics = &result.summary.metrics;
    doc.section(SECTION_CONVERSATION, Some(&result.conversation_id));
    doc.field("source", result.source.as_str());
    doc.field("created_at", &result.created_at.to_rfc3339());
    doc.field("updated_at", &result.updated_at.to_rfc3339());
    doc.field("total_messages", &metrics.total_messages.to_string());
    doc.field("user_messages", &metrics.user_messages.to_string());
    doc.field("ai_messages", &metrics.ai_messages.to_string());
    doc.field("total_characters", &metrics.total_characters.to_string());

    doc.section(SECTION_FLOW, None);
    doc.list("sequence", result.flow.sequence.iter().map(String::as_str));
    doc.field("turns", &result.flow.turns.to_string());
    doc.field("dominant_role", result.flow.dominant_role.as_str());

    doc.section(SECTION_DETAILS, None);
    for intent in &result.intents {
        doc.record(
            "intent",
            &[
                &timestamp(intent.timestamp),
                intent.confidence.as_str(),
                intent.inferred_from.as_str(),
                &index(intent.message_index),
                &intent.intent,
            ],
        );
    }
    for action in &result.actions {
        doc.record(
            "action",
            &[
                &timestamp(action.timestamp),
                action.action_type.as_str(),
                action.source.as_str(),
                &index(action.message_index),
                &action.details,
            ],
        );
    }

    doc.section(SECTION_INSIGHTS, None);
    for work in &result.technical_work {
        doc.record(
            "technical_work",
            &[
                &timestamp(work.timestamp),
                work.work_type.as_str(),
                work.source.as_str(),
                &index(work.message_index),
                &work.work,
            ],
        );
    }

    doc.section(SECTION_DECISIONS, None);
    for decision in &result.decisions {
        doc.record(
            "decision",
            &[
                &timestamp(decision.timestamp),
                decision.impact.as_str(),
                decision.source.as_str(),
                &index(decision.message_index),
                &decision.decision,
                &decision.context,
            ],
        );
    }

    doc.section(SECTION_STATE, None);
    doc.field("current_task", &result.state.current_task);
    doc.list("blockers", result.state.blockers.iter().map(String::as_str));
    doc.field("next_action", &result.state.next_action);
    doc.field("last_update", &result.state.last_update.to_rfc3339());

    doc.finish()
}

fn timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn index(i: Option<usize>) -> String {
    i.map(|i| i.to_string()).unwrap_or_default()
}

#[derive(Default)]
struct Writer {
    out: String,
}

impl Writer {
    fn section(&mut self, name: &str, label: Option<&str>) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out.push('@');
        self.out.push_str(name);
        if let Some(label) = label {
            self.out.push(':');
            self.out.push_str(&escape(label));
        }
        self.out.push('\n');
    }

    fn field(&mut self, key: &str, value: &str) {
        self.line(key, &escape(value));
    }

    fn list<'a>(&mut self, key: &str, items: impl Iterator<Item = &'a str>) {
        let joined: Vec<String> = items.map(escape).collect();
        self.line(key, &joined.join("|"));
    }

    fn record(&mut self, key: &str, fields: &[&str]) {
        self.list(key, fields.iter().copied());
    }

    fn line(&mut self, key: &str, raw: &str) {
        self.out.push_str(key);
        self.out.push('=');
        self.out.push_str(raw);
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Escape a value for a `key=value` line.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '_' => out.push_str("\\_"),
            ' ' => out.push('_'),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape`]. Unknown escapes keep the escaped character.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '_' => out.push(' '),
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

/// Split a raw value on unescaped pipes, then unescape each item.
fn split_items(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in raw.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '|' => {
                items.push(unescape(&raw[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(unescape(&raw[start..]));
    items
}

// ============================================
// Parsing
// ============================================

/// A parsed structured artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AicfDocument {
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub label: Option<String>,
    pub entries: Vec<Entry>,
}

/// One `key=value` line, value still escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub raw: String,
}

impl Entry {
    /// The value as a single string.
    pub fn value(&self) -> String {
        unescape(&self.raw)
    }

    /// The value as a pipe-delimited sequence.
    pub fn items(&self) -> Vec<String> {
        split_items(&self.raw)
    }
}

impl AicfDocument {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

impl Section {
    /// First entry with `key`.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// All entries with `key`, in order.
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |e| e.key == key)
    }
}

/// Parse structured artifact text.
///
/// Blank lines are ignored. A `key=value` line before the first section, a
/// line that is neither, or a key that is not snake_case is a
/// [`Error::Parsing`].
pub fn parse(text: &str) -> Result<AicfDocument> {
    let mut doc = AicfDocument::default();

    for (n, line) in text.lines().enumerate() {
        let line_no = n + 1;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('@') {
            let (name, label) = match header.split_once(':') {
                Some((name, label)) => (name, Some(unescape(label))),
                None => (header, None),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                return Err(syntax(line_no, format!("invalid section name {name:?}")));
            }
            doc.sections.push(Section {
                name: name.to_string(),
                label,
                entries: Vec::new(),
            });
            continue;
        }

        let Some((key, raw)) = line.split_once('=') else {
            return Err(syntax(line_no, "expected key=value"));
        };
        if !is_snake_case(key) {
            return Err(syntax(line_no, format!("key {key:?} is not snake_case")));
        }
        let Some(section) = doc.sections.last_mut() else {
            return Err(syntax(line_no, "field outside of any section"));
        };
        section.entries.push(Entry {
            key: key.to_string(),
            raw: raw.to_string(),
        });
    }

    Ok(doc)
}

fn is_snake_case(key: &str) -> bool {
    !key.is_empty()
        && key.starts_with(|c: char| c.is_ascii_lowercase())
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn syntax(line: usize, message: impl std::fmt::Display) -> Error {
    Error::parsing("aicf", format!("line {line}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ConversationOrchestrator;
    use crate::types::{Conversation, Message, Role, SourcePlatform};

    fn analysis(contents: &[(Role, &str)]) -> AnalysisResult {
        let messages = contents
            .iter()
            .map(|(role, content)| Message::new("conv_1", *role, *content, None))
            .collect();
        let conversation = Conversation::from_messages("conv_1", SourcePlatform::Generic, messages);
        ConversationOrchestrator::new()
            .analyze_conversation(&conversation)
            .unwrap()
    }

    #[test]
    fn test_escape_roundtrip() {
        let tricky = "snake_case | pipes\\ and\nnew lines\r\n=equals= @at";
        let escaped = escape(tricky);
        assert!(!escaped.contains(' '));
        assert!(!escaped.contains('\n'));
        assert_eq!(unescape(&escaped), tricky);
        assert_eq!(escape("a b"), "a_b");
    }

    #[test]
    fn test_split_items_respects_escaped_pipes() {
        assert_eq!(split_items(r"a|b\|c|d_e"), vec!["a", "b|c", "d e"]);
        assert!(split_items("").is_empty());
    }

    #[test]
    fn test_render_has_all_sections_in_order() {
        let text = render(&analysis(&[(Role::User, "hi"), (Role::Assistant, "hello")]));
        let doc = parse(&text).unwrap();
        let names: Vec<_> = doc.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, REQUIRED_SECTIONS);
        assert_eq!(
            doc.section(SECTION_CONVERSATION).unwrap().label.as_deref(),
            Some("conv_1")
        );
        assert_eq!(
            doc.section(SECTION_HEADER).unwrap().get("version").unwrap().value(),
            FORMAT_VERSION
        );
    }

    #[test]
    fn test_facts_round_trip_losslessly() {
        let question = "Should we use snake_case | or kebab?\nAlso: a \\ b";
        let answer = "We decided to refactor the architecture.\n```\nfn main() {}\n```";
        let result = analysis(&[(Role::User, question), (Role::Assistant, answer)]);
        let doc = parse(&render(&result)).unwrap();

        let details = doc.section(SECTION_DETAILS).unwrap();
        let intent = details.get("intent").unwrap().items();
        assert_eq!(intent.len(), 5);
        assert_eq!(intent[1], "high");
        assert_eq!(intent[2], "conversation_summary");
        assert_eq!(intent[3], "0");
        assert_eq!(intent[4], question);

        let action = details.get("action").unwrap().items();
        assert_eq!(action[1], "agent_action");
        assert_eq!(action[4], answer);

        let flow = doc.section(SECTION_FLOW).unwrap();
        assert_eq!(
            flow.get("sequence").unwrap().items(),
            vec!["user_short", "assistant_short"]
        );

        let decisions: Vec<_> = doc
            .section(SECTION_DECISIONS)
            .unwrap()
            .all("decision")
            .map(Entry::items)
            .collect();
        assert!(decisions
            .iter()
            .any(|d| d[4] == "We decided to refactor the architecture." && d[1] == "high"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let result = analysis(&[(Role::User, "same input")]);
        assert_eq!(render(&result), render(&result));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse("version=1\n").is_err());
        assert!(parse("@AICF\nnot a field\n").is_err());
        assert!(parse("@AICF\nBadKey=1\n").is_err());
        assert!(parse("@aicf\n").is_err());
        assert!(parse("").unwrap().sections.is_empty());
    }
}
