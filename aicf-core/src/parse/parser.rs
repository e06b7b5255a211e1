//! Parser trait abstraction
//!
//! All platform parsers implement the [`PlatformParser`] trait to provide
//! a unified interface for detecting and parsing raw captures.
//!
//! ## Design Principles
//!
//! 1. **Lossless capture**: message content is never trimmed to a width or elided
//! 2. **Resilience**: empty or malformed records yield fewer messages, not errors
//! 3. **All or nothing**: a payload that cannot be recognized at all returns
//!    [`Error::Parsing`](crate::error::Error::Parsing), never a garbled list
//! 4. **Side-effect free detection**: [`PlatformParser::detect`] only inspects
//!    the payload

use crate::error::Result;
use crate::types::{Message, SourcePlatform};

/// Trait implemented by all platform parsers.
///
/// ## Example
///
/// ```rust,ignore
/// use aicf_core::parse::PlatformParser;
///
/// struct MyParser;
///
/// impl PlatformParser for MyParser {
///     fn platform(&self) -> SourcePlatform { SourcePlatform::Generic }
///     // ... implement other methods
/// }
/// ```
pub trait PlatformParser: Send + Sync {
    /// Which platform this parser handles
    fn platform(&self) -> SourcePlatform;

    /// Whether `payload` looks like this parser's format.
    ///
    /// Pure predicate: callers use it to pick a parser without committing
    /// to a parse.
    fn detect(&self, payload: &str) -> bool;

    /// Parse a raw payload into ordered canonical messages.
    ///
    /// `conversation_id` is used for every message unless the payload embeds
    /// its own conversation id.
    ///
    /// ## Error Handling
    ///
    /// - Empty input and records without usable content are skipped
    /// - Only structurally unrecognizable payloads return `Err`
    fn parse(&self, raw_payload: &str, conversation_id: &str) -> Result<Vec<Message>>;
}

/// Decode JSON-style escape sequences inside a string literal body.
///
/// Handles `\n \t \r \" \\ \/ \b \f` and `\uXXXX` (including surrogate
/// pairs). Unknown escapes and unpaired surrogates are kept verbatim, and
/// every non-escaped character is copied unchanged.
pub(crate) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match decode_unicode_escape(&hex, &mut chars) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

fn decode_unicode_escape(
    hex: &str,
    rest: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Option<char> {
    if hex.len() != 4 {
        return None;
    }
    let high = u32::from_str_radix(hex, 16).ok()?;

    if (0xD800..0xDC00).contains(&high) {
        // Need a following \uDC00-\uDFFF low surrogate
        let lookahead: String = rest.clone().take(6).collect();
        let low_hex = lookahead.strip_prefix("\\u")?;
        let low = u32::from_str_radix(low_hex, 16).ok()?;
        if !(0xDC00..0xE000).contains(&low) {
            return None;
        }
        for _ in 0..6 {
            rest.next();
        }
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        return char::from_u32(combined);
    }

    char::from_u32(high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_whitespace_and_quotes() {
        assert_eq!(unescape(r#"a\nb\tc \"q\" \\ d"#), "a\nb\tc \"q\" \\ d");
    }

    #[test]
    fn test_unescape_unicode() {
        assert_eq!(unescape(r"caf\u00e9"), "café");
        assert_eq!(unescape(r"\ud83d\ude80 launch"), "🚀 launch");
    }

    #[test]
    fn test_unescape_preserves_raw_unicode_and_unknown_escapes() {
        assert_eq!(unescape("日本語 ✓"), "日本語 ✓");
        assert_eq!(unescape(r"\q stays"), r"\q stays");
        assert_eq!(unescape(r"\ud83d alone"), r"\ud83d alone");
    }
}
