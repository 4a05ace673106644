//! Progress-callback trait for phase and file events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the run moves through its phases.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfgrid::{PipelineConfig, PipelineProgressCallback, PipelineState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     files: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, phase: PipelineState, file: &str, done: usize, total: usize) {
//!         self.files.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{phase}: {file} ({done}/{total})");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { files: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::PipelineState;
use std::sync::Arc;

/// Called by the pipeline as it processes a run.
///
/// Implementations must be `Send + Sync`: inside a tonal stage files are
/// transformed concurrently and `on_file_complete` may be called from
/// different tasks. All methods have default no-op implementations.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before rasterisation starts.
    fn on_run_start(&self, run_id: &str) {
        let _ = run_id;
    }

    /// Called when the run enters a phase.
    fn on_phase_start(&self, phase: PipelineState) {
        let _ = phase;
    }

    /// Called after each staged file of a tonal stage has been written.
    ///
    /// # Arguments
    /// * `phase` — the tonal stage
    /// * `file`  — file name (stable across stages)
    /// * `done`  — files finished so far in this stage
    /// * `total` — qualifying files in this stage
    fn on_file_complete(&self, phase: PipelineState, file: &str, done: usize, total: usize) {
        let _ = (phase, file, done, total);
    }

    /// Called when a phase has finished every file.
    fn on_phase_complete(&self, phase: PipelineState, files: usize) {
        let _ = (phase, files);
    }

    /// Called once after cleanup of a successful run.
    ///
    /// # Arguments
    /// * `pages` — output document pages (0 when there was nothing to tile)
    /// * `tiles` — images placed
    fn on_run_complete(&self, pages: usize, tiles: usize) {
        let _ = (pages, tiles);
    }

    /// Called once after cleanup of a failed run.
    ///
    /// # Arguments
    /// * `phase` — the phase that failed
    /// * `error` — human-readable error description
    fn on_run_failed(&self, phase: PipelineState, error: &str) {
        let _ = (phase, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
