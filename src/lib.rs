//! # edgequake-pdfgrid
//!
//! Rasterise every page of a PDF, darken the pages through a fixed
//! three-stage tonal pipeline, and tile the results into a grid PDF.
//!
//! ## Why this crate?
//!
//! Slide decks and scanned handouts print badly: dark backgrounds waste ink
//! and one slide per page wastes paper. This crate turns a document into a
//! compact contact sheet of high-contrast, inverted thumbnails, each with
//! its page number, ready to print.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate the file (magic bytes, readability)
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Stage 1    grayscale, negate, ×1.3 − 50
//!  ├─ 4. Stage 2    negate, ×1.2 − 30
//!  ├─ 5. Final      negate, ×1.5 − 30
//!  ├─ 6. Assemble   rows × columns tiles per A4 page, bordered and numbered
//!  └─ 7. Clean up   remove the run's staging directories
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfgrid::{run, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .output_dir("out")
//!         .build()?;
//!     // 3 rows × 2 columns; None keeps the default for that dimension
//!     let output = run("slides.pdf", Some(3), None, &config).await?;
//!     eprintln!("{} tiles on {} pages", output.stats.tiles, output.stats.output_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfgrid` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfgrid = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Rendering and writing PDFs go through a pdfium shared library, found via
//! `PDFIUM_LIB_PATH`, then the working directory, then the system library
//! path. Tests and callers that only need the layout can inject their own
//! [`Rasterizer`] and use the [`LayoutRecorder`] backend instead.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GridLayout, PipelineConfig, PipelineConfigBuilder};
pub use error::{PdfGridError, PipelineWarning};
pub use output::{DocumentInfo, PipelineOutput, PipelineStats};
pub use pipeline::canvas::{
    AssembledDocument, Canvas, DocumentBackend, ImageFit, LayoutRecorder, PdfiumBackend, Rect,
};
pub use pipeline::grid::{AssemblyReport, TilePlacement, TileSlot};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use pipeline::PipelineState;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use run::{inspect, inspect_with_password, run, run_from_bytes, run_sync};
