//! Result types returned by the `run*` and `inspect` entry points.

use crate::config::GridLayout;
use crate::error::PipelineWarning;
use crate::pipeline::grid::TilePlacement;
use crate::pipeline::PipelineState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Unique identifier of this run; also names its staging root.
    pub run_id: String,

    /// Where the assembled document was written.
    ///
    /// `None` when there were no images to tile: an empty input produces no
    /// document and is not an error.
    pub output_path: Option<PathBuf>,

    /// Layout actually used, after out-of-range values fell back to defaults.
    pub layout: GridLayout,

    /// Terminal state of the run. Always [`PipelineState::Done`] for a
    /// returned output.
    pub final_state: PipelineState,

    /// Where each image went, in sequence order.
    pub placements: Vec<TilePlacement>,

    /// Non-fatal problems: tile fallbacks, cleanup failures.
    pub warnings: Vec<PipelineWarning>,

    pub stats: PipelineStats,
}

impl PipelineOutput {
    /// `true` when no document was produced.
    pub fn is_empty(&self) -> bool {
        self.output_path.is_none()
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Pages rasterised from the source document.
    pub source_pages: usize,
    /// Images that reached the final stage.
    pub tiles: usize,
    /// Pages in the assembled document.
    pub output_pages: usize,
    /// Bytes written to the output document.
    pub output_bytes: u64,

    pub render_duration_ms: u64,
    /// All three tonal stages together.
    pub transform_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Basic facts about a source PDF, read without rendering it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}
