//! Augment log-store parser
//!
//! Augment keeps chat history in an embedded key-value store whose values
//! are JSON exchange records. Reading the store files yields those records
//! interleaved with binary framing, so this parser scans for the string
//! fields it needs instead of parsing whole documents:
//!
//! ```text
//! ..\x00{"request_id":"r1","request_message":"How do I...","response_text":"Use...",
//!        "timestamp":"2025-01-02T03:04:05Z","conversationId":"c-42"}\x01..
//! ```
//!
//! Each object that directly holds a `request_message` or `response_text` is
//! one exchange, whatever the order of its fields. Exchanges may sit side by
//! side or nested in a holder object (`{"conversationId":..,"chatHistory":[..]}`),
//! whose conversation id they inherit. An object with only a `response_text`
//! forms an assistant-only exchange; objects with neither text field are ignored.
//!
//! String bodies are decoded with [`unescape`](crate::parse::parser::unescape),
//! so escaped whitespace and quotes come back as real characters and all
//! other content, including non-ASCII text, is copied unchanged.

use crate::error::Result;
use crate::parse::parser::{unescape, PlatformParser};
use crate::types::{Message, Role, SourcePlatform};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

const REQUEST_KEY: &str = "request_message";
const RESPONSE_KEY: &str = "response_text";

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#""(request_message|response_text|request_id|timestamp|conversationId|conversation_id)"\s*:\s*"((?:[^"\\]|\\.)*)""#,
        )
        .expect("valid regex")
    })
}

/// Parser for Augment's embedded log-store payloads.
#[derive(Debug, Default)]
pub struct AugmentParser;

impl AugmentParser {
    pub fn new() -> Self {
        Self
    }
}

/// One request/response pair being assembled from scanned fields.
#[derive(Debug, Default)]
struct Exchange {
    request: Option<String>,
    response: Option<String>,
    request_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    conversation_id: Option<String>,
}

impl Exchange {
    fn is_empty(&self) -> bool {
        self.request.is_none() && self.response.is_none()
    }

    /// Record one scanned field; the first occurrence of a key wins.
    fn set(&mut self, key: &str, value: String) {
        let slot = match key {
            REQUEST_KEY => &mut self.request,
            RESPONSE_KEY => &mut self.response,
            "request_id" => &mut self.request_id,
            "timestamp" => {
                if self.timestamp.is_none() {
                    self.timestamp = DateTime::parse_from_rfc3339(&value)
                        .ok()
                        .map(|ts| ts.with_timezone(&Utc));
                }
                return;
            }
            _ => &mut self.conversation_id,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fn into_messages(self, default_conversation: &str, out: &mut Vec<Message>) {
        let conversation = self
            .conversation_id
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| default_conversation.to_string());

        for (role, text, suffix) in [
            (Role::User, self.request, "user"),
            (Role::Assistant, self.response, "assistant"),
        ] {
            let Some(text) = text else { continue };
            if text.trim().is_empty() {
                continue;
            }
            let mut message = Message::new(conversation.clone(), role, text, self.timestamp);
            if let Some(ref rid) = self.request_id {
                message = message.with_id(format!("{rid}-{suffix}"));
            }
            if !out.iter().any(|m| m.is_duplicate_of(&message)) {
                out.push(message);
            }
        }
    }
}

impl PlatformParser for AugmentParser {
    fn platform(&self) -> SourcePlatform {
        SourcePlatform::Augment
    }

    fn detect(&self, payload: &str) -> bool {
        payload.contains(&format!("\"{REQUEST_KEY}\""))
            || payload.contains(&format!("\"{RESPONSE_KEY}\""))
    }

    fn parse(&self, raw_payload: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let spans = object_spans(raw_payload);
        let mut exchanges: Vec<Exchange> = spans.iter().map(|_| Exchange::default()).collect();
        // Fields outside every object, keyed by the first one's offset
        let mut loose: Option<(usize, Exchange)> = None;

        for caps in field_regex().captures_iter(raw_payload) {
            let offset = caps.get(0).map_or(0, |m| m.start());
            let value = unescape(&caps[2]);
            match innermost(&spans, offset) {
                Some(idx) => exchanges[idx].set(&caps[1], value),
                None => loose
                    .get_or_insert_with(|| (offset, Exchange::default()))
                    .1
                    .set(&caps[1], value),
            }
        }

        // Holder objects such as `{"conversationId":..,"chatHistory":[..]}`
        // pass their id down to the exchanges nested in them
        for idx in 0..spans.len() {
            if exchanges[idx].conversation_id.is_some() {
                continue;
            }
            let mut parent = spans[idx].parent;
            let mut inherited = None;
            while let Some(p) = parent {
                if let Some(id) = &exchanges[p].conversation_id {
                    inherited = Some(id.clone());
                    break;
                }
                parent = spans[p].parent;
            }
            exchanges[idx].conversation_id = inherited;
        }

        let mut ordered: Vec<(usize, Exchange)> = spans
            .iter()
            .map(|span| span.start)
            .zip(exchanges)
            .filter(|(_, exchange)| !exchange.is_empty())
            .collect();
        if let Some(entry) = loose.filter(|(_, exchange)| !exchange.is_empty()) {
            ordered.push(entry);
        }
        ordered.sort_by_key(|(offset, _)| *offset);

        let mut messages = Vec::new();
        for (_, exchange) in ordered {
            exchange.into_messages(conversation_id, &mut messages);
        }

        tracing::debug!(
            conversation = %conversation_id,
            objects = spans.len(),
            messages = messages.len(),
            "Parsed Augment payload"
        );

        Ok(messages)
    }
}

/// Byte range of one `{...}` object and the object enclosing it.
#[derive(Debug, Clone, Copy)]
struct ObjectSpan {
    start: usize,
    end: usize,
    parent: Option<usize>,
}

/// Find every `{...}` object in a payload, in order of its opening brace.
///
/// Braces inside string literals are ignored. An object never closed (a stray
/// framing byte or a truncated record) runs to the end of the payload, which
/// leaves the objects inside it intact. JSON strings never hold a raw control
/// character, so meeting one inside a string drops back out of string state.
fn object_spans(payload: &str) -> Vec<ObjectSpan> {
    let mut spans: Vec<ObjectSpan> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in payload.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                c if (c as u32) < 0x20 => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => {
                spans.push(ObjectSpan {
                    start: i,
                    end: payload.len(),
                    parent: open.last().copied(),
                });
                open.push(spans.len() - 1);
            }
            '}' => {
                if let Some(idx) = open.pop() {
                    spans[idx].end = i + 1;
                }
            }
            _ => {}
        }
    }
    spans
}

/// Index of the innermost object containing `offset`.
fn innermost(spans: &[ObjectSpan], offset: usize) -> Option<usize> {
    let candidates = spans.partition_point(|s| s.start <= offset);
    (0..candidates).rev().find(|&idx| spans[idx].end > offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        let parser = AugmentParser::new();
        assert!(parser.detect(r#"{"request_message":"hi"}"#));
        assert!(parser.detect("\u{0}\u{1}\"response_text\":\"ok\""));
        assert!(!parser.detect(r#"[{"role":"user","content":"hi"}]"#));
    }

    #[test]
    fn test_parse_exchange_with_binary_framing() {
        let payload = "\u{0}\u{3}{\"request_id\":\"r1\",\"request_message\":\"How do I implement a parser?\",\
            \"response_text\":\"Use a tokenizer.\\nThen a \\\"recursive\\\" descent.\",\
            \"timestamp\":\"2025-01-02T03:04:05Z\"}\u{1}";
        let messages = AugmentParser::new().parse(payload, "conv-1").unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "How do I implement a parser?");
        assert_eq!(messages[0].id, "r1-user");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(
            messages[1].content,
            "Use a tokenizer.\nThen a \"recursive\" descent."
        );
        assert_eq!(
            messages[1].timestamp.unwrap().to_rfc3339(),
            "2025-01-02T03:04:05+00:00"
        );
        assert!(messages.iter().all(|m| m.conversation_id == "conv-1"));
    }

    #[test]
    fn test_embedded_conversation_id_wins() {
        let payload = r#"{"conversationId":"c-42","request_message":"a","response_text":"b"}"#;
        let messages = AugmentParser::new().parse(payload, "fallback").unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.conversation_id == "c-42"));
    }

    #[test]
    fn test_unicode_preserved() {
        let payload = r#"{"request_message":"Привет 👋 — naïve café","response_text":"日本語で"}"#;
        let messages = AugmentParser::new().parse(payload, "c").unwrap();
        assert_eq!(messages[0].content, "Привет 👋 — naïve café");
        assert_eq!(messages[1].content, "日本語で");
    }

    #[test]
    fn test_multiple_exchanges_keep_order_and_skip_repeats() {
        let record = r#"{"request_message":"first","response_text":"one"}"#;
        let payload = format!(
            "{record}\u{0}{record}\u{0}{}",
            r#"{"request_message":"second","response_text":"two"}"#
        );
        let messages = AugmentParser::new().parse(&payload, "c").unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "one", "second", "two"]);
    }

    #[test]
    fn test_long_content_not_truncated() {
        let long = "x".repeat(50_000);
        let payload = format!(r#"{{"request_message":"{long}"}}"#);
        let messages = AugmentParser::new().parse(&payload, "c").unwrap();
        assert_eq!(messages[0].content.len(), 50_000);
    }

    #[test]
    fn test_nested_chat_history_yields_every_exchange() {
        let payload = r#"{"conversationId":"c","chatHistory":[{"request_message":"q1","response_text":"a1"},{"request_message":"q2","response_text":"a2"}]}"#;
        let messages = AugmentParser::new().parse(payload, "fallback").unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
        assert!(messages.iter().all(|m| m.conversation_id == "c"));
    }

    #[test]
    fn test_unmatched_brace_in_framing_keeps_later_records() {
        let payload = "\u{0}{\u{7}{\"request_message\":\"q1\",\"response_text\":\"a1\"}\u{0}\
            {\"request_message\":\"q2\",\"response_text\":\"a2\"}\u{1}";
        let messages = AugmentParser::new().parse(payload, "c").unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    }

    #[test]
    fn test_stray_quote_in_framing_does_not_swallow_records() {
        let payload = "{\"x\":1,\u{0}\"\u{2}{\"request_message\":\"q1\",\"response_text\":\"a1\"}";
        let messages = AugmentParser::new().parse(payload, "c").unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1"]);
    }

    #[test]
    fn test_empty_and_garbage_yield_empty() {
        let parser = AugmentParser::new();
        assert!(parser.parse("", "c").unwrap().is_empty());
        assert!(parser
            .parse("\u{0}\u{0}\"request_message\":\"unterminated", "c")
            .unwrap()
            .is_empty());
    }
}
