//! Whole-pipeline tests that need no pdfium library.
//!
//! A fake [`Rasterizer`] writes synthetic page images and the
//! [`LayoutRecorder`] backend stands in for the PDF writer, so every phase
//! of a real run executes: staging, the three tonal stages, grid layout,
//! output writing and cleanup.

use edgequake_pdfgrid::pipeline::canvas::DrawOp;
use edgequake_pdfgrid::{
    run, run_from_bytes, AssembledDocument, DocumentBackend, GridLayout, LayoutRecorder,
    PdfGridError, PipelineConfig, PipelineProgressCallback, PipelineState, Rasterizer,
};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Writes `pages` uniform images of the given gray level.
struct FakeRasterizer {
    pages: usize,
    gray: u8,
    /// Write this 1-based page as garbage instead of a PNG.
    corrupt_page: Option<usize>,
}

impl FakeRasterizer {
    fn new(pages: usize) -> Self {
        Self {
            pages,
            gray: 128,
            corrupt_page: None,
        }
    }
}

impl Rasterizer for FakeRasterizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn rasterize(&self, _source: &Path, target_dir: &Path) -> Result<usize, PdfGridError> {
        for n in 1..=self.pages {
            let path = target_dir.join(format!("page-{n:04}.png"));
            if self.corrupt_page == Some(n) {
                std::fs::write(&path, b"\x89PNG but not really").unwrap();
            } else {
                RgbImage::from_pixel(60, 80, Rgb([self.gray; 3]))
                    .save(&path)
                    .unwrap();
            }
        }
        Ok(self.pages)
    }
}

/// Fails like pdfium does on a broken page.
struct BrokenRasterizer;

impl Rasterizer for BrokenRasterizer {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn rasterize(&self, _source: &Path, target_dir: &Path) -> Result<usize, PdfGridError> {
        RgbImage::new(4, 4).save(target_dir.join("page-0001.png")).unwrap();
        Err(PdfGridError::RasterisationFailed {
            page: 2,
            detail: "FPDF_ERR_FORMAT".into(),
        })
    }
}

/// Records the first pixel of every final image, then lays them out.
#[derive(Default)]
struct PixelSampler {
    seen: Mutex<Vec<u8>>,
}

impl DocumentBackend for PixelSampler {
    fn name(&self) -> &'static str {
        "pixel-sampler"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn assemble(
        &self,
        images: &[PathBuf],
        layout: GridLayout,
    ) -> Result<AssembledDocument, PdfGridError> {
        let mut seen = self.seen.lock().unwrap();
        for path in images {
            seen.push(image::open(path).unwrap().to_luma8().get_pixel(0, 0).0[0]);
        }
        LayoutRecorder.assemble(images, layout)
    }
}

#[derive(Default)]
struct PhaseLog {
    phases: Mutex<Vec<PipelineState>>,
    failed: Mutex<Option<(PipelineState, String)>>,
}

impl PipelineProgressCallback for PhaseLog {
    fn on_phase_start(&self, phase: PipelineState) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_run_failed(&self, phase: PipelineState, error: &str) {
        *self.failed.lock().unwrap() = Some((phase, error.to_string()));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Route pipeline logs through the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fixture {
    tmp: TempDir,
    input: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input.pdf");
        std::fs::write(&input, b"%PDF-1.7\n%%EOF\n").unwrap();
        Self { tmp, input }
    }

    fn work_dir(&self) -> PathBuf {
        self.tmp.path().join("work")
    }

    fn output_dir(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    fn config(&self, rasterizer: impl Rasterizer + 'static) -> PipelineConfig {
        PipelineConfig::builder()
            .work_dir(self.work_dir())
            .output_dir(self.output_dir())
            .rasterizer(Arc::new(rasterizer))
            .backend(Arc::new(LayoutRecorder))
            .build()
            .unwrap()
    }

    /// Nothing left under the work directory.
    fn assert_no_staging(&self) {
        let work = self.work_dir();
        if work.exists() {
            let left: Vec<_> = std::fs::read_dir(&work)
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            assert!(left.is_empty(), "staging leftovers: {left:?}");
        }
    }
}

fn recorded_ops(path: &Path) -> Vec<DrawOp> {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

// ── Layout ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn nine_pages_on_default_grid() {
    let fx = Fixture::new();
    let output = run(&fx.input, None, None, &fx.config(FakeRasterizer::new(9)))
        .await
        .unwrap();

    assert_eq!(output.final_state, PipelineState::Done);
    assert_eq!(output.layout, GridLayout::default());
    assert_eq!(output.stats.source_pages, 9);
    assert_eq!(output.stats.tiles, 9);
    assert_eq!(output.stats.output_pages, 2);

    let ninth = &output.placements[8];
    assert_eq!(ninth.slot.sequence, 9);
    assert_eq!((ninth.slot.page, ninth.slot.column, ninth.slot.row), (1, 0, 0));

    let sequences: Vec<usize> = output.placements.iter().map(|p| p.slot.sequence).collect();
    assert_eq!(sequences, (1..=9).collect::<Vec<_>>());

    let path = output.output_path.clone().unwrap();
    assert_eq!(path, fx.output_dir().join(format!("{}.json", output.run_id)));
    let pages = recorded_ops(&path)
        .iter()
        .filter(|op| matches!(op, DrawOp::BeginPage { .. }))
        .count();
    assert_eq!(pages, 2);
}

#[tokio::test]
async fn page_count_is_ceiling_of_tiles_over_grid() {
    for (pages, rows, columns, expected) in [(1, 4, 2, 1), (8, 4, 2, 1), (8, 1, 1, 8), (21, 4, 5, 2)] {
        let fx = Fixture::new();
        let output = run(
            &fx.input,
            Some(rows),
            Some(columns),
            &fx.config(FakeRasterizer::new(pages)),
        )
        .await
        .unwrap();
        assert_eq!(output.stats.output_pages, expected, "{pages} pages at {rows}x{columns}");
    }
}

#[tokio::test]
async fn out_of_range_columns_fall_back_to_default() {
    let fx = Fixture::new();
    let output = run(&fx.input, Some(3), Some(15), &fx.config(FakeRasterizer::new(7)))
        .await
        .unwrap();
    assert_eq!(output.layout.columns(), 2);
    assert_eq!(output.layout.rows(), 3);
    assert_eq!(output.stats.output_pages, 2);
}

#[tokio::test]
async fn empty_document_writes_nothing() {
    let fx = Fixture::new();
    let output = run(&fx.input, None, None, &fx.config(FakeRasterizer::new(0)))
        .await
        .unwrap();

    assert!(output.is_empty());
    assert_eq!(output.final_state, PipelineState::Done);
    assert_eq!(output.stats.tiles, 0);
    assert_eq!(output.stats.output_pages, 0);
    assert!(!fx.output_dir().exists());
    fx.assert_no_staging();
}

#[tokio::test]
async fn layout_is_identical_across_runs() {
    let fx = Fixture::new();
    let config = fx.config(FakeRasterizer::new(11));
    let a = run(&fx.input, Some(3), Some(3), &config).await.unwrap();
    let b = run(&fx.input, Some(3), Some(3), &config).await.unwrap();

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.placements, b.placements);
    assert_eq!(
        std::fs::read(a.output_path.unwrap()).unwrap(),
        std::fs::read(b.output_path.unwrap()).unwrap()
    );
}

// ── Tonal stages ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn uniform_gray_reaches_closed_form_value() {
    let fx = Fixture::new();
    let sampler = Arc::new(PixelSampler::default());
    let config = PipelineConfig::builder()
        .work_dir(fx.work_dir())
        .output_dir(fx.output_dir())
        .rasterizer(Arc::new(FakeRasterizer::new(3)))
        .backend(sampler.clone())
        .build()
        .unwrap();

    run(&fx.input, None, None, &config).await.unwrap();

    // 128 → 127 → 115 → 140 → 138 → 117 → 145.5 → 146
    assert_eq!(*sampler.seen.lock().unwrap(), vec![146, 146, 146]);
}

#[tokio::test]
async fn black_pages_end_up_white() {
    let fx = Fixture::new();
    let sampler = Arc::new(PixelSampler::default());
    let config = PipelineConfig::builder()
        .work_dir(fx.work_dir())
        .output_dir(fx.output_dir())
        .rasterizer(Arc::new(FakeRasterizer {
            pages: 1,
            gray: 0,
            corrupt_page: None,
        }))
        .backend(sampler.clone())
        .build()
        .unwrap();

    run(&fx.input, None, None, &config).await.unwrap();
    assert_eq!(*sampler.seen.lock().unwrap(), vec![255]);
}

#[tokio::test]
async fn half_way_values_round_up_through_the_chain() {
    let fx = Fixture::new();
    let sampler = Arc::new(PixelSampler::default());
    let config = PipelineConfig::builder()
        .work_dir(fx.work_dir())
        .output_dir(fx.output_dir())
        .rasterizer(Arc::new(FakeRasterizer {
            pages: 2,
            gray: 90,
            corrupt_page: None,
        }))
        .backend(sampler.clone())
        .build()
        .unwrap();

    run(&fx.input, None, None, &config).await.unwrap();

    // 90 → 165 → 164.5 → 165 → 90 → 78 → 177 → 235.5 → 236
    assert_eq!(*sampler.seen.lock().unwrap(), vec![236, 236]);
}

// ── Cleanup and failure ──────────────────────────────────────────────────────

#[tokio::test]
async fn staging_is_removed_after_success() {
    let fx = Fixture::new();
    run(&fx.input, None, None, &fx.config(FakeRasterizer::new(5)))
        .await
        .unwrap();
    fx.assert_no_staging();
}

#[tokio::test]
async fn staging_is_removed_after_stage_failure() {
    let fx = Fixture::new();
    let log = Arc::new(PhaseLog::default());
    let config = PipelineConfig::builder()
        .work_dir(fx.work_dir())
        .output_dir(fx.output_dir())
        .rasterizer(Arc::new(FakeRasterizer {
            pages: 5,
            gray: 90,
            corrupt_page: Some(3),
        }))
        .backend(Arc::new(LayoutRecorder))
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let err = run(&fx.input, None, None, &config).await.unwrap_err();
    match err {
        PdfGridError::TransformFailed { ref stage, ref file, .. } => {
            assert_eq!(stage, "stage1");
            assert_eq!(file, "page-0003.png");
        }
        ref other => panic!("expected TransformFailed, got {other}"),
    }

    fx.assert_no_staging();
    assert!(!fx.output_dir().exists());

    let (phase, message) = log.failed.lock().unwrap().clone().unwrap();
    assert_eq!(phase, PipelineState::Stage1);
    assert_eq!(message, err.to_string());
    assert_eq!(log.phases.lock().unwrap().last(), Some(&PipelineState::CleaningUp));
}

#[tokio::test]
async fn rasteriser_error_is_returned_unmodified() {
    let fx = Fixture::new();
    let err = run(&fx.input, None, None, &fx.config(BrokenRasterizer))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PdfGridError::RasterisationFailed { page: 2, ref detail } if detail == "FPDF_ERR_FORMAT"
    ));
    fx.assert_no_staging();
}

#[tokio::test]
async fn non_pdf_input_is_rejected_before_any_phase() {
    let fx = Fixture::new();
    let bogus = fx.tmp.path().join("notes.pdf");
    std::fs::write(&bogus, b"hello world").unwrap();
    let err = run(&bogus, None, None, &fx.config(FakeRasterizer::new(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, PdfGridError::NotAPdf { .. }));
    assert!(!fx.work_dir().exists());
}

// ── Progress and entry points ────────────────────────────────────────────────

#[tokio::test]
async fn phases_are_reported_in_order() {
    let fx = Fixture::new();
    let log = Arc::new(PhaseLog::default());
    let config = PipelineConfig::builder()
        .work_dir(fx.work_dir())
        .output_dir(fx.output_dir())
        .rasterizer(Arc::new(FakeRasterizer::new(2)))
        .backend(Arc::new(LayoutRecorder))
        .progress_callback(log.clone())
        .build()
        .unwrap();

    run(&fx.input, None, None, &config).await.unwrap();

    use PipelineState::*;
    assert_eq!(
        *log.phases.lock().unwrap(),
        vec![Rasterizing, Stage1, Stage2, Final, Assembling, CleaningUp]
    );
    assert!(log.failed.lock().unwrap().is_none());
}

#[tokio::test]
async fn bytes_input_runs_like_a_file() {
    let fx = Fixture::new();
    let output = run_from_bytes(
        b"%PDF-1.4\n%%EOF\n",
        Some(2),
        Some(2),
        &fx.config(FakeRasterizer::new(5)),
    )
    .await
    .unwrap();
    assert_eq!(output.stats.output_pages, 2);
    fx.assert_no_staging();
}

#[tokio::test]
async fn fixed_output_path_is_overwritten() {
    let fx = Fixture::new();
    let fixed = fx.tmp.path().join("latest.json");
    let config = |pages| {
        PipelineConfig::builder()
            .work_dir(fx.work_dir())
            .output_path(&fixed)
            .rasterizer(Arc::new(FakeRasterizer::new(pages)))
            .backend(Arc::new(LayoutRecorder))
            .build()
            .unwrap()
    };

    run(&fx.input, None, None, &config(9)).await.unwrap();
    let second = run(&fx.input, None, None, &config(1)).await.unwrap();

    assert_eq!(second.output_path.as_deref(), Some(fixed.as_path()));
    let pages = recorded_ops(&fixed)
        .iter()
        .filter(|op| matches!(op, DrawOp::BeginPage { .. }))
        .count();
    assert_eq!(pages, 1);
}

#[tokio::test]
async fn concurrent_runs_do_not_share_staging() {
    let fx = Fixture::new();
    let small = fx.config(FakeRasterizer::new(3));
    let large = fx.config(FakeRasterizer::new(17));

    let (a, b) = tokio::join!(
        run(&fx.input, None, None, &small),
        run(&fx.input, None, None, &large)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.stats.tiles, 3);
    assert_eq!(b.stats.tiles, 17);
    assert_ne!(a.output_path, b.output_path);
    fx.assert_no_staging();
}

#[test]
fn callbacks_and_backends_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<PhaseLog>();
    assert_send_sync::<PixelSampler>();
    assert_send_sync::<PipelineConfig>();
}
