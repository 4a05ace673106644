//! Pipeline entry points.
//!
//! A run walks a fixed sequence of phases:
//!
//! ```text
//! Idle → Rasterizing → Stage1 → Stage2 → Final → Assembling → CleaningUp → Done
//!                                                                       ↘ Failed
//! ```
//!
//! Each phase reads the previous phase's staging directory and writes its
//! own, so there is a hard barrier between phases. Whatever happens, the
//! run's staging root is removed before returning; a cleanup problem is
//! logged and reported as a warning and never replaces the error that
//! ended the run.

use crate::config::{GridLayout, PipelineConfig};
use crate::error::{PdfGridError, PipelineWarning};
use crate::output::{DocumentInfo, PipelineOutput, PipelineStats};
use crate::pipeline::canvas::{DocumentBackend, PdfiumBackend};
use crate::pipeline::grid::{self, AssemblyOutcome, TilePlacement};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::render::{self, PdfiumRasterizer, Rasterizer};
use crate::pipeline::staging::{Phase, StagingArea};
use crate::pipeline::tone::{self, STAGE_FINAL, STAGE_ONE, STAGE_TWO};
use crate::pipeline::PipelineState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Rasterise `input`, run the three tonal stages and tile the result.
///
/// `rows` and `columns` are taken as requested; a missing or out-of-range
/// value silently falls back to its default (4 rows, 2 columns).
///
/// # Returns
/// `Ok(PipelineOutput)` on success. When the document had no pages to tile
/// no file is written and `output.output_path` is `None`.
///
/// # Errors
/// The first fatal error of the run, unmodified, after the staging
/// directories have been removed.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfgrid::{run, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let output = run("slides.pdf", Some(3), Some(2), &config).await?;
/// if let Some(path) = &output.output_path {
///     println!("{} tiles on {} pages → {}", output.stats.tiles, output.stats.output_pages, path.display());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run(
    input: impl AsRef<Path>,
    rows: Option<i64>,
    columns: Option<i64>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PdfGridError> {
    let resolved = input::resolve_local(input)?;
    run_resolved(resolved, rows, columns, config).await
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    input: impl AsRef<Path>,
    rows: Option<i64>,
    columns: Option<i64>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PdfGridError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfGridError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(input, rows, columns, config))
}

/// Run the pipeline on PDF bytes held in memory, e.g. an upload.
///
/// The bytes are written to a managed temp file that is removed when the
/// run returns.
pub async fn run_from_bytes(
    bytes: &[u8],
    rows: Option<i64>,
    columns: Option<i64>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PdfGridError> {
    let resolved = input::resolve_bytes(bytes)?;
    run_resolved(resolved, rows, columns, config).await
}

/// Read page count and metadata without running the pipeline.
pub async fn inspect(input: impl AsRef<Path>) -> Result<DocumentInfo, PdfGridError> {
    inspect_with_password(input, None).await
}

/// [`inspect`] for encrypted documents.
pub async fn inspect_with_password(
    input: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentInfo, PdfGridError> {
    let resolved = input::resolve_local(input)?;
    let path = resolved.path().to_path_buf();
    let password = password.map(str::to_owned);
    tokio::task::spawn_blocking(move || render::document_info(&path, password.as_deref()))
        .await
        .map_err(|e| PdfGridError::Internal(format!("Inspect task panicked: {}", e)))?
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Pre-built rasteriser if one was injected, pdfium otherwise.
fn resolve_rasterizer(config: &PipelineConfig) -> Arc<dyn Rasterizer> {
    match config.rasterizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(PdfiumRasterizer::from_config(config)),
    }
}

/// Pre-built backend if one was injected, pdfium otherwise.
fn resolve_backend(config: &PipelineConfig) -> Arc<dyn DocumentBackend> {
    match config.backend {
        Some(ref b) => Arc::clone(b),
        None => Arc::new(PdfiumBackend),
    }
}

/// Where the document of `run_id` goes.
fn output_target(config: &PipelineConfig, run_id: &str, extension: &str) -> PathBuf {
    config
        .output_path
        .clone()
        .unwrap_or_else(|| config.output_dir.join(format!("{run_id}.{extension}")))
}

/// Write `bytes` to `path` through a temp file and a rename, so readers
/// never see a partial document. The temp name carries the run id because
/// several runs may target the same fixed output path.
async fn write_atomic(path: &Path, run_id: &str, bytes: &[u8]) -> Result<(), PdfGridError> {
    let write_err = |source| PdfGridError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.{run_id}.tmp"));

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

/// What the phases before cleanup produced.
struct Assembled {
    output_path: Option<PathBuf>,
    placements: Vec<TilePlacement>,
    warnings: Vec<PipelineWarning>,
}

/// State of one run while it is in flight.
struct PipelineRun<'a> {
    run_id: String,
    config: &'a PipelineConfig,
    layout: GridLayout,
    staging: StagingArea,
    state: PipelineState,
    stats: PipelineStats,
}

impl<'a> PipelineRun<'a> {
    fn new(config: &'a PipelineConfig, layout: GridLayout) -> Self {
        let run_id = Uuid::new_v4().to_string();
        let staging = StagingArea::new(&config.work_dir, &run_id);
        Self {
            run_id,
            config,
            layout,
            staging,
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        }
    }

    fn enter(&mut self, state: PipelineState) {
        debug!("Run {}: {} → {}", self.run_id, self.state, state);
        self.state = state;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_phase_start(state);
        }
    }

    /// Step to the next state on the success path.
    fn advance(&mut self) {
        self.enter(self.state.next());
    }

    /// Settle into `Done` after a clean run or `Failed` otherwise.
    fn finish(&mut self, succeeded: bool) {
        self.state = if succeeded {
            self.state.next()
        } else {
            PipelineState::Failed
        };
        debug_assert!(self.state.is_terminal(), "run ended in {}", self.state);
    }

    fn complete(&self, files: usize) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_phase_complete(self.state, files);
        }
    }

    async fn execute(&mut self, source: &Path) -> Result<Assembled, PdfGridError> {
        // ── Rasterise ────────────────────────────────────────────────────
        self.advance();
        let render_start = Instant::now();
        let target = self.staging.prepare(Phase::Rasterized)?;
        let rasterizer = resolve_rasterizer(self.config);
        let source_owned = source.to_path_buf();
        info!("Rasterising '{}' via {}", source.display(), rasterizer.name());
        let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&source_owned, &target))
            .await
            .map_err(|e| PdfGridError::Internal(format!("Render task panicked: {}", e)))??;
        self.stats.source_pages = pages;
        self.stats.render_duration_ms = render_start.elapsed().as_millis() as u64;
        info!("Rasterised {} pages in {}ms", pages, self.stats.render_duration_ms);
        self.complete(pages);

        // ── Tonal stages ─────────────────────────────────────────────────
        let transform_start = Instant::now();
        let stages = [
            (STAGE_ONE, Phase::Rasterized, Phase::Stage1),
            (STAGE_TWO, Phase::Stage1, Phase::Stage2),
            (STAGE_FINAL, Phase::Stage2, Phase::Final),
        ];
        for (stage, from, to) in stages {
            self.advance();
            let state = self.state;
            let report = tone::run_stage(
                stage,
                &self.staging.dir(from),
                &self.staging.dir(to),
                self.config.concurrency,
                state,
                self.config.progress_callback.clone(),
            )
            .await?;
            self.staging.absorb(report.warnings);
            self.stats.tiles = report.files;
            self.complete(report.files);
        }
        self.stats.transform_duration_ms = transform_start.elapsed().as_millis() as u64;

        // ── Assemble ─────────────────────────────────────────────────────
        self.advance();
        let assemble_start = Instant::now();
        let backend = resolve_backend(self.config);
        let final_dir = self.staging.dir(Phase::Final);
        let layout = self.layout;
        let extension = backend.extension();
        let outcome =
            tokio::task::spawn_blocking(move || grid::assemble_dir(backend.as_ref(), &final_dir, layout))
                .await
                .map_err(|e| PdfGridError::Internal(format!("Assemble task panicked: {}", e)))??;

        let assembled = match outcome {
            AssemblyOutcome::Empty => Assembled {
                output_path: None,
                placements: Vec::new(),
                warnings: Vec::new(),
            },
            AssemblyOutcome::Assembled(document) => {
                let path = output_target(self.config, &self.run_id, extension);
                write_atomic(&path, &self.run_id, &document.bytes).await?;
                self.stats.output_pages = document.report.pages;
                self.stats.output_bytes = document.bytes.len() as u64;
                info!(
                    "Wrote {} pages ({} bytes) to '{}'",
                    document.report.pages,
                    document.bytes.len(),
                    path.display()
                );
                Assembled {
                    output_path: Some(path),
                    placements: document.report.placements,
                    warnings: document.report.warnings,
                }
            }
        };
        self.stats.assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;
        self.complete(self.stats.output_pages);

        Ok(assembled)
    }

    /// Remove the staging root and return every staging warning of the run.
    ///
    /// Reachable from any state, so a failed phase still cleans up.
    fn clean_up(&mut self) -> Vec<PipelineWarning> {
        self.enter(PipelineState::CleaningUp);
        self.staging.release_all();
        let warnings = self.staging.take_warnings();
        for w in &warnings {
            warn!("Run {}: {}", self.run_id, w);
        }
        warnings
    }
}

async fn run_resolved(
    resolved: ResolvedInput,
    rows: Option<i64>,
    columns: Option<i64>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PdfGridError> {
    let total_start = Instant::now();
    let layout = GridLayout::resolve(rows, columns);
    let mut run = PipelineRun::new(config, layout);
    info!(
        "Run {} started: '{}', {} grid",
        run.run_id,
        resolved.path().display(),
        layout
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(&run.run_id);
    }

    let result = run.execute(resolved.path()).await;
    let phase = run.state;
    let cleanup_warnings = run.clean_up();

    match result {
        Ok(assembled) => {
            run.finish(true);
            run.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
            info!(
                "Run {} complete: {} tiles on {} pages, {}ms total",
                run.run_id, run.stats.tiles, run.stats.output_pages, run.stats.total_duration_ms
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_run_complete(run.stats.output_pages, run.stats.tiles);
            }

            let mut warnings = assembled.warnings;
            warnings.extend(cleanup_warnings);
            Ok(PipelineOutput {
                run_id: run.run_id.clone(),
                output_path: assembled.output_path,
                layout,
                final_state: run.state,
                placements: assembled.placements,
                warnings,
                stats: run.stats.clone(),
            })
        }
        Err(e) => {
            run.finish(false);
            error!("Run {} failed during {}: {}", run.run_id, phase, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_run_failed(phase, &e.to_string());
            }
            Err(e)
        }
    }
}
