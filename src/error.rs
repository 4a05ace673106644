//! Error types for the edgequake-pdfgrid library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`PdfGridError`] — **Fatal**: the run cannot proceed (bad input file,
//!   wrong password, a tonal stage failed on one image, the output could not
//!   be written). Returned as `Err(PdfGridError)` from the top-level `run*`
//!   functions after the staging directories have been cleaned up.
//!
//! * [`PipelineWarning`] — **Non-fatal**: something went wrong but the run
//!   carried on (a tile fell back to a stretched draw, a staged file could
//!   not be deleted). Collected in [`crate::output::PipelineOutput::warnings`]
//!   so callers can report them without ever confusing them with the primary
//!   result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfgrid library.
#[derive(Debug, Error)]
pub enum PdfGridError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Transform errors ──────────────────────────────────────────────────
    /// Reading, transforming or writing one staged image failed.
    ///
    /// Fatal to the whole stage: a tonal stage never skips a file.
    #[error("Stage '{stage}' failed on '{file}': {detail}")]
    TransformFailed {
        stage: String,
        file: String,
        detail: String,
    },

    /// A staging directory could not be created or listed.
    #[error("Staging directory error at '{path}': {source}")]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// The drawing backend could not create a page or serialise the document.
    #[error("Canvas error: {0}")]
    CanvasFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the binary's working directory.\n\
  • Install pdfium into a directory on the system library path.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem encountered during a run.
///
/// The run still produced its output; these are reported alongside it.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PipelineWarning {
    /// A staged file or directory could not be removed.
    #[error("Cleanup of '{path}' failed: {detail}")]
    CleanupFailed { path: PathBuf, detail: String },

    /// Fit-scaling a tile image failed; it was drawn stretched to the tile.
    #[error("Tile {sequence} ('{file}'): fit draw failed, stretched instead: {detail}")]
    FitFallback {
        sequence: usize,
        file: String,
        detail: String,
    },

    /// Both the fit draw and the stretch fallback failed; the tile has a
    /// border and label but no image.
    #[error("Tile {sequence} ('{file}'): image skipped: {detail}")]
    TileSkipped {
        sequence: usize,
        file: String,
        detail: String,
    },
}

impl PdfGridError {
    /// Wrap a per-file failure inside a tonal stage.
    pub(crate) fn transform(stage: &str, file: impl Into<String>, detail: impl ToString) -> Self {
        PdfGridError::TransformFailed {
            stage: stage.to_string(),
            file: file.into(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_failed_display() {
        let e = PdfGridError::transform("stage2", "page-0003.png", "decode error");
        let msg = e.to_string();
        assert!(msg.contains("stage2"), "got: {msg}");
        assert!(msg.contains("page-0003.png"), "got: {msg}");
        assert!(msg.contains("decode error"), "got: {msg}");
    }

    #[test]
    fn staging_io_keeps_source() {
        use std::error::Error as _;
        let e = PdfGridError::StagingIo {
            path: PathBuf::from("/tmp/run/stage1"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("stage1"));
    }

    #[test]
    fn warning_display_mentions_tile() {
        let w = PipelineWarning::FitFallback {
            sequence: 7,
            file: "page-0007.png".into(),
            detail: "zero-sized image".into(),
        };
        assert!(w.to_string().contains("Tile 7"));
        assert!(w.to_string().contains("stretched"));
    }

    #[test]
    fn warning_serialises() {
        let w = PipelineWarning::CleanupFailed {
            path: PathBuf::from("/tmp/x"),
            detail: "busy".into(),
        };
        let json = serde_json::to_string(&w).unwrap();
        let back: PipelineWarning = serde_json::from_str(&json).unwrap();
        assert_eq!(w, back);
    }
}
