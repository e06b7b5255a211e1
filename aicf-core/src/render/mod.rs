//! Memory file rendering
//!
//! An [`AnalysisResult`] is rendered twice: as a structured AICF artifact for
//! machines ([`structured`]) and as narrative markdown for people
//! ([`narrative`]). Rendering is pure; persistence lives in
//! [`crate::storage`].

pub mod narrative;
pub mod structured;

use crate::config::RenderConfig;
use crate::types::AnalysisResult;

/// Both renderings of one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMemory {
    pub structured: String,
    pub narrative: String,
}

/// Renders analysis results into memory files.
#[derive(Debug, Clone)]
pub struct MemoryFileWriter {
    narrative_title_len: usize,
}

impl Default for MemoryFileWriter {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl MemoryFileWriter {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            narrative_title_len: config.narrative_title_len,
        }
    }

    pub fn render(&self, result: &AnalysisResult) -> RenderedMemory {
        RenderedMemory {
            structured: structured::render(result),
            narrative: narrative::render(result, self.narrative_title_len),
        }
    }
}
