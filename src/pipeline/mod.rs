//! Pipeline stages for the rasterise → darken → grid run.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the two external capabilities (rasterising, drawing) can be
//! swapped behind traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ tone ×3 ──▶ grid ──▶ canvas
//! (path)    (pdfium)   (image)     (layout)  (pdfium / recorder)
//!                │          │
//!                └── staging (one directory per phase) ──┘
//! ```
//!
//! 1. [`input`]   — validate the user-supplied path as a PDF
//! 2. [`render`]  — rasterise every page to a PNG in the `rasterized` directory
//! 3. [`tone`]    — three negate + linear stages, directory to directory
//! 4. [`grid`]    — tile the final images into pages of rows × columns
//! 5. [`canvas`]  — draw the tiles and serialise the document
//!
//! [`staging`] owns the per-run directories and [`encode`] knows which
//! raster formats may be staged and how to write each of them.

pub mod canvas;
pub mod encode;
pub mod grid;
pub mod input;
pub mod render;
pub mod staging;
pub mod tone;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a run currently is.
///
/// Strictly linear: `Idle → Rasterizing → Stage1 → Stage2 → Final →
/// Assembling → CleaningUp → Done`, or `Failed` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Rasterizing,
    Stage1,
    Stage2,
    Final,
    Assembling,
    CleaningUp,
    Done,
    Failed,
}

impl PipelineState {
    /// The state that follows `self` on success. Terminal states map to themselves.
    pub fn next(self) -> Self {
        use PipelineState::*;
        match self {
            Idle => Rasterizing,
            Rasterizing => Stage1,
            Stage1 => Stage2,
            Stage2 => Final,
            Final => Assembling,
            Assembling => CleaningUp,
            CleaningUp => Done,
            Done => Done,
            Failed => Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Rasterizing => "rasterizing",
            PipelineState::Stage1 => "stage1",
            PipelineState::Stage2 => "stage2",
            PipelineState::Final => "final",
            PipelineState::Assembling => "assembling",
            PipelineState::CleaningUp => "cleaning-up",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}
