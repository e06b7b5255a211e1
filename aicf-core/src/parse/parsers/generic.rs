//! Generic fallback parser
//!
//! Accepts whatever a platform without a dedicated parser hands us. Formats
//! are tried in this order:
//!
//! 1. **JSON**: an array of records, a single record, or an object holding a
//!    `messages` array (optionally under `conversation`)
//! 2. **JSONL**: one JSON record per non-empty line
//! 3. **Role lines**: `user: ...` / `assistant: ...`, continuation lines
//!    belong to the previous speaker
//! 4. **Markdown**: `## User` / `### Assistant` headings or `**User:**` labels
//! 5. **Raw text**: the whole payload becomes one user message
//!
//! A payload that starts like JSON but is neither valid JSON nor JSONL is
//! structurally unrecognizable and returns [`Error::Parsing`]; guessing at
//! half-parsed JSON would produce garbled messages.

use crate::error::{Error, Result};
use crate::parse::parser::PlatformParser;
use crate::types::{Message, Role, SourcePlatform};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const ROLE_KEYS: &[&str] = &["role", "author", "sender", "speaker", "from", "type"];
const CONTENT_KEYS: &[&str] = &["content", "text", "message", "body"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "createdAt", "created_at", "time", "ts"];
const ID_KEYS: &[&str] = &["id", "uuid", "messageId", "message_id"];
const CONVERSATION_KEYS: &[&str] = &["conversationId", "conversation_id", "sessionId", "session_id"];

fn role_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z]+)\s*:\s?(.*)$").expect("valid regex"))
}

fn markdown_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:#{1,6}\s*(?:\*\*)?([A-Za-z]+)(?:\*\*)?\s*:?\s*$|\*\*([A-Za-z]+):?\*\*:?\s?(.*)$)")
            .expect("valid regex")
    })
}

/// Parser for JSON, JSONL, role-prefixed lines, markdown and raw text.
#[derive(Debug, Default)]
pub struct GenericParser;

impl GenericParser {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformParser for GenericParser {
    fn platform(&self) -> SourcePlatform {
        SourcePlatform::Generic
    }

    /// The generic parser accepts anything; it is the last resort.
    fn detect(&self, _payload: &str) -> bool {
        true
    }

    fn parse(&self, raw_payload: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let trimmed = raw_payload.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            return match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => parse_json_value(&value, conversation_id),
                Err(json_err) => match parse_jsonl(trimmed, conversation_id) {
                    Some(messages) => Ok(messages),
                    None => Err(Error::parsing(
                        SourcePlatform::Generic.as_str(),
                        format!("payload looks like JSON but is not valid JSON or JSONL: {json_err}"),
                    )),
                },
            };
        }

        if let Some(messages) = parse_role_lines(raw_payload, conversation_id) {
            return Ok(messages);
        }

        if let Some(messages) = parse_markdown(raw_payload, conversation_id) {
            return Ok(messages);
        }

        Ok(vec![Message::new(conversation_id, Role::User, trimmed, None)])
    }
}

// ============================================
// JSON
// ============================================

fn parse_json_value(value: &Value, conversation_id: &str) -> Result<Vec<Message>> {
    match value {
        Value::Array(records) => Ok(records_to_messages(records, conversation_id)),
        Value::Object(obj) => {
            let holder = obj
                .get("conversation")
                .filter(|c| c.get("messages").is_some())
                .unwrap_or(value);

            if let Some(Value::Array(records)) = holder.get("messages") {
                let conversation = string_field(holder, CONVERSATION_KEYS)
                    .or_else(|| string_field(holder, &["id"]))
                    .unwrap_or_else(|| conversation_id.to_string());
                return Ok(records_to_messages(records, &conversation));
            }

            Ok(record_to_message(value, conversation_id).into_iter().collect())
        }
        other => Err(Error::parsing(
            SourcePlatform::Generic.as_str(),
            format!("expected a JSON object or array, found {}", json_kind(other)),
        )),
    }
}

fn parse_jsonl(payload: &str, conversation_id: &str) -> Option<Vec<Message>> {
    let mut records = Vec::new();
    for line in payload.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<Value>(line.trim()) {
            Ok(value @ Value::Object(_)) => records.push(value),
            _ => return None,
        }
    }
    Some(records_to_messages(&records, conversation_id))
}

fn records_to_messages(records: &[Value], conversation_id: &str) -> Vec<Message> {
    let messages: Vec<Message> = records
        .iter()
        .filter_map(|r| record_to_message(r, conversation_id))
        .collect();

    let skipped = records.len() - messages.len();
    if skipped > 0 {
        tracing::debug!(skipped, "Skipped records without role or content");
    }
    messages
}

fn record_to_message(record: &Value, conversation_id: &str) -> Option<Message> {
    let role = ROLE_KEYS
        .iter()
        .filter_map(|k| record.get(*k).and_then(Value::as_str))
        .find_map(Role::from_label)?;

    let content = CONTENT_KEYS
        .iter()
        .filter_map(|k| record.get(*k))
        .find_map(content_text)?;
    if content.trim().is_empty() {
        return None;
    }

    let timestamp = TIMESTAMP_KEYS
        .iter()
        .filter_map(|k| record.get(*k))
        .find_map(parse_timestamp);

    let conversation =
        string_field(record, CONVERSATION_KEYS).unwrap_or_else(|| conversation_id.to_string());

    let message = Message::new(conversation, role, content, timestamp);
    Some(match string_field(record, ID_KEYS) {
        Some(id) => message.with_id(id),
        None => message,
    })
}

/// Text of a content field: a string, an array of blocks, or a nested object.
fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let parts: Vec<String> = blocks
                .iter()
                .filter_map(|b| match b {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => b.get("text").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        }
        Value::Object(_) => CONTENT_KEYS
            .iter()
            .filter_map(|k| value.get(*k))
            .find_map(content_text),
        _ => None,
    }
}

/// RFC 3339 strings, or epoch seconds / milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw > 1_000_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

fn string_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| record.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================
// Text formats
// ============================================

/// Accumulates lines for the speaker currently talking.
struct TurnBuilder<'a> {
    conversation_id: &'a str,
    messages: Vec<Message>,
    current: Option<(Role, Vec<&'a str>)>,
}

impl<'a> TurnBuilder<'a> {
    fn new(conversation_id: &'a str) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            current: None,
        }
    }

    fn start(&mut self, role: Role, first_line: Option<&'a str>) {
        self.flush();
        self.current = Some((role, first_line.into_iter().collect()));
    }

    fn push(&mut self, line: &'a str) {
        if let Some((_, lines)) = self.current.as_mut() {
            lines.push(line);
        }
    }

    fn flush(&mut self) {
        if let Some((role, lines)) = self.current.take() {
            let text = lines.join("\n");
            let text = text.trim_matches(|c| c == '\n' || c == '\r');
            if !text.trim().is_empty() {
                self.messages
                    .push(Message::new(self.conversation_id, role, text, None));
            }
        }
    }

    fn finish(mut self) -> Vec<Message> {
        self.flush();
        self.messages
    }
}

fn parse_role_lines<'a>(payload: &'a str, conversation_id: &'a str) -> Option<Vec<Message>> {
    let first = payload.lines().find(|l| !l.trim().is_empty())?;
    let caps = role_line_regex().captures(first)?;
    Role::from_label(&caps[1])?;

    let mut builder = TurnBuilder::new(conversation_id);
    for line in payload.lines() {
        let speaker = role_line_regex().captures(line).and_then(|caps| {
            let role = Role::from_label(caps.get(1)?.as_str())?;
            Some((role, caps.get(2)?.as_str()))
        });
        match speaker {
            Some((role, rest)) => builder.start(role, Some(rest)),
            None => builder.push(line),
        }
    }
    Some(builder.finish())
}

fn parse_markdown<'a>(payload: &'a str, conversation_id: &'a str) -> Option<Vec<Message>> {
    let mut builder = TurnBuilder::new(conversation_id);
    let mut saw_heading = false;

    for line in payload.lines() {
        let heading = markdown_heading_regex().captures(line).and_then(|caps| {
            if let Some(label) = caps.get(1) {
                Some((Role::from_label(label.as_str())?, None))
            } else {
                let role = Role::from_label(caps.get(2)?.as_str())?;
                let rest = caps.get(3).map(|m| m.as_str()).filter(|s| !s.is_empty());
                Some((role, rest))
            }
        });
        match heading {
            Some((role, rest)) => {
                saw_heading = true;
                builder.start(role, rest);
            }
            None => builder.push(line),
        }
    }

    saw_heading.then(|| builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> Result<Vec<Message>> {
        GenericParser::new().parse(payload, "conv")
    }

    #[test]
    fn test_empty_payload() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   \n\t").unwrap().is_empty());
    }

    #[test]
    fn test_json_array() {
        let payload = r#"[
            {"role": "user", "content": "How do I implement a parser?", "timestamp": "2025-03-01T10:00:00Z"},
            {"role": "assistant", "content": "Here is how you implement a parser with TypeScript."}
        ]"#;
        let messages = parse(payload).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[0].timestamp.is_some());
        assert_eq!(
            messages[1].content,
            "Here is how you implement a parser with TypeScript."
        );
    }

    #[test]
    fn test_json_single_record_and_wrapper() {
        let single = parse(r#"{"sender": "human", "text": "hello", "id": "m-7"}"#).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].id, "m-7");

        let wrapped = parse(
            r#"{"conversation": {"id": "c-9", "messages": [{"role": "ai", "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}]}}"#,
        )
        .unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].conversation_id, "c-9");
        assert_eq!(wrapped[0].content, "a\nb");
    }

    #[test]
    fn test_json_records_without_content_are_skipped() {
        let messages = parse(r#"[{"role": "user"}, {"role": "narrator", "content": "x"}]"#).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_jsonl() {
        let payload = "{\"role\":\"user\",\"content\":\"one\",\"ts\":1735689600}\n\n{\"role\":\"assistant\",\"content\":\"two\",\"ts\":1735689600123}\n";
        let messages = parse(payload).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].timestamp.unwrap().timestamp(), 1_735_689_600);
        assert_eq!(messages[1].timestamp.unwrap().timestamp_millis(), 1_735_689_600_123);
    }

    #[test]
    fn test_broken_json_is_parsing_error() {
        let err = parse(r#"[{"role": "user", "content": "unterminated"#).unwrap_err();
        assert!(matches!(err, Error::Parsing { .. }));
    }

    #[test]
    fn test_role_lines_with_continuation() {
        let payload = "User: first line\nsecond line\nAssistant: reply\n\nwith a gap\nuser: again";
        let messages = parse(payload).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "first line\nsecond line");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "reply\n\nwith a gap");
        assert_eq!(messages[2].content, "again");
    }

    #[test]
    fn test_markdown_headings() {
        let payload = "# Session\n\n## User\n\nWhat is Rust?\n\n## Assistant\n\nA language.\n\n```rust\nfn main() {}\n```\n";
        let messages = parse(payload).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "What is Rust?");
        assert_eq!(messages[1].content, "A language.\n\n```rust\nfn main() {}\n```");
    }

    #[test]
    fn test_markdown_bold_labels() {
        let payload = "**User:** ping\n**Assistant:** pong";
        let messages = parse(payload).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "ping");
        assert_eq!(messages[1].content, "pong");
    }

    #[test]
    fn test_raw_text_single_message() {
        let messages = parse("just some notes about the build").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "just some notes about the build");
    }

    #[test]
    fn test_array_of_scalars_yields_empty() {
        let messages = parse("[1, 2, 3]").unwrap();
        assert!(messages.is_empty());
    }
}
