//! Configuration types for a rasterise → darken → grid run.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The grid shape itself is a per-request value
//! ([`GridLayout`]) because callers usually pick it per upload.

use crate::error::PdfGridError;
use crate::pipeline::canvas::DocumentBackend;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_pdfgrid::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_rendered_pixels(1600)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Longest edge, in pixels, of each rasterised page. Range: 100–10000. Default: 1200.
    ///
    /// Pages end up as thumbnails a few hundred points wide, so there is no
    /// point rendering at print resolution.
    pub max_rendered_pixels: u32,

    /// Number of images transformed at once inside a tonal stage. Default: 4.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Parent directory for per-run staging directories.
    ///
    /// Each run stages under `<work_dir>/<run_id>/` and removes that
    /// directory when it finishes, successfully or not.
    pub work_dir: PathBuf,

    /// Directory receiving `<run_id>.pdf` when `output_path` is unset.
    pub output_dir: PathBuf,

    /// Fixed output location. Every run overwrites it. Default: None.
    pub output_path: Option<PathBuf>,

    /// Pre-constructed rasteriser. Default: pdfium.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Pre-constructed document backend. Default: pdfium.
    pub backend: Option<Arc<dyn DocumentBackend>>,

    /// Receives phase and file events while the run progresses.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            max_rendered_pixels: 1200,
            concurrency: 4,
            password: None,
            work_dir: tmp.join("edgequake-pdfgrid"),
            output_dir: tmp.join("edgequake-pdfgrid-output"),
            output_path: None,
            rasterizer: None,
            backend: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("work_dir", &self.work_dir)
            .field("output_dir", &self.output_dir)
            .field("output_path", &self.output_path)
            .field("rasterizer", &self.rasterizer.as_ref().map(|r| r.name()))
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(100, 10_000);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = Some(path.into());
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn DocumentBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PdfGridError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PdfGridError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.work_dir.as_os_str().is_empty() {
            return Err(PdfGridError::InvalidConfig(
                "Work directory must not be empty".into(),
            ));
        }
        if let Some(ref out) = c.output_path {
            if out.starts_with(&c.work_dir) {
                return Err(PdfGridError::InvalidConfig(format!(
                    "Output path '{}' must not live inside the work directory",
                    out.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Grid layout ──────────────────────────────────────────────────────────

/// Rows × columns of tiles on every output page.
///
/// Built with [`GridLayout::resolve`], which never fails: a missing or
/// out-of-range dimension falls back to its default while the other
/// dimension is kept. Deserialising goes through [`GridLayout::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLayout")]
pub struct GridLayout {
    rows: u32,
    columns: u32,
}

#[derive(Deserialize)]
struct RawLayout {
    rows: u32,
    columns: u32,
}

impl TryFrom<RawLayout> for GridLayout {
    type Error = PdfGridError;

    fn try_from(raw: RawLayout) -> Result<Self, Self::Error> {
        GridLayout::new(raw.rows, raw.columns)
    }
}

impl GridLayout {
    pub const MIN_ROWS: u32 = 1;
    pub const MAX_ROWS: u32 = 20;
    pub const MIN_COLUMNS: u32 = 1;
    pub const MAX_COLUMNS: u32 = 10;
    pub const DEFAULT_ROWS: u32 = 4;
    pub const DEFAULT_COLUMNS: u32 = 2;

    /// Resolve a requested layout, substituting defaults per dimension.
    pub fn resolve(rows: Option<i64>, columns: Option<i64>) -> Self {
        Self {
            rows: pick(rows, Self::MIN_ROWS, Self::MAX_ROWS, Self::DEFAULT_ROWS),
            columns: pick(
                columns,
                Self::MIN_COLUMNS,
                Self::MAX_COLUMNS,
                Self::DEFAULT_COLUMNS,
            ),
        }
    }

    /// Strict constructor for callers that want out-of-range input rejected.
    pub fn new(rows: u32, columns: u32) -> Result<Self, PdfGridError> {
        if !(Self::MIN_ROWS..=Self::MAX_ROWS).contains(&rows) {
            return Err(PdfGridError::InvalidConfig(format!(
                "rows must be {}–{}, got {rows}",
                Self::MIN_ROWS,
                Self::MAX_ROWS
            )));
        }
        if !(Self::MIN_COLUMNS..=Self::MAX_COLUMNS).contains(&columns) {
            return Err(PdfGridError::InvalidConfig(format!(
                "columns must be {}–{}, got {columns}",
                Self::MIN_COLUMNS,
                Self::MAX_COLUMNS
            )));
        }
        Ok(Self { rows, columns })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Tiles that fit on one output page.
    pub fn tiles_per_page(&self) -> usize {
        (self.rows * self.columns) as usize
    }

    /// Output pages needed for `tiles` images.
    pub fn page_count(&self, tiles: usize) -> usize {
        tiles.div_ceil(self.tiles_per_page())
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            rows: Self::DEFAULT_ROWS,
            columns: Self::DEFAULT_COLUMNS,
        }
    }
}

impl fmt::Display for GridLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

fn pick(requested: Option<i64>, min: u32, max: u32, default: u32) -> u32 {
    match requested {
        Some(v) if v >= i64::from(min) && v <= i64::from(max) => v as u32,
        _ => default,
    }
}
