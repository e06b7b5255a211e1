//! Platform-specific parsers
//!
//! Each supported platform has a parser module that implements
//! the [`PlatformParser`](super::PlatformParser) trait.
//!
//! ## Supported Platforms
//!
//! | Platform | Module | Detects |
//! |----------|--------|---------|
//! | Augment | [`augment`] | `"request_message"` / `"response_text"` fields |
//! | Generic | [`generic`] | anything (fallback) |

mod augment;
mod generic;

pub use augment::AugmentParser;
pub use generic::GenericParser;

use super::PlatformParser;
use crate::types::SourcePlatform;

/// Create all available parsers in detection priority order.
///
/// The generic parser is always last: it accepts any payload.
pub fn create_all_parsers() -> Vec<Box<dyn PlatformParser>> {
    vec![Box::new(AugmentParser::new()), Box::new(GenericParser::new())]
}

/// Get the parser dedicated to a platform.
///
/// Returns `None` for [`SourcePlatform::Unknown`]; callers detect the format instead.
pub fn parser_for(platform: SourcePlatform) -> Option<Box<dyn PlatformParser>> {
    match platform {
        SourcePlatform::Augment => Some(Box::new(AugmentParser::new())),
        SourcePlatform::Generic => Some(Box::new(GenericParser::new())),
        SourcePlatform::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_all_parsers_generic_last() {
        let parsers = create_all_parsers();
        assert_eq!(parsers.len(), 2);
        assert_eq!(parsers[0].platform(), SourcePlatform::Augment);
        assert_eq!(
            parsers.last().map(|p| p.platform()),
            Some(SourcePlatform::Generic)
        );
    }

    #[test]
    fn test_parser_for_known_platforms() {
        let parser = parser_for(SourcePlatform::Augment);
        assert_eq!(parser.unwrap().platform(), SourcePlatform::Augment);
        let parser = parser_for(SourcePlatform::Generic);
        assert_eq!(parser.unwrap().platform(), SourcePlatform::Generic);
    }

    #[test]
    fn test_parser_for_unknown() {
        assert!(parser_for(SourcePlatform::Unknown).is_none());
    }
}
