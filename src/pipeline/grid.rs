//! Grid assembly: tile a sorted image sequence into fixed-size pages.
//!
//! ## Geometry
//!
//! Pages are A4 in points (595 × 842). For a layout of `rows × columns`:
//!
//! ```text
//! tile_width  = 595 / columns
//! tile_height = 0.9 × 842 / rows      (bottom 10 % of the page stays empty)
//! ```
//!
//! Image `i` (0-based) lands on page `i / (rows × columns)` in cell
//! `(i mod columns, (i / columns) mod rows)`, i.e. row-major, wrapping to a
//! new page when the grid is full. Inside its tile the image is fit into
//! the box inset by 4 points on each side, anchored top-left. Every tile
//! gets a 1-point border and its 1-based sequence number near the
//! bottom-right corner; numbering runs across pages.
//!
//! ## Draw failures
//!
//! A failed fit draw is retried once, stretched to the full unpadded tile.
//! If that fails too the image is left out; the tile still gets its border
//! and number so the numbering stays aligned with the input. Both cases are
//! reported as [`PipelineWarning`]s, never as errors.

use crate::config::GridLayout;
use crate::error::{PdfGridError, PipelineWarning};
use crate::pipeline::canvas::{AssembledDocument, Canvas, DocumentBackend, ImageFit, Rect};
use crate::pipeline::encode::{display_name, list_raster_files};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
/// Share of the page height the grid may occupy.
pub const GRID_HEIGHT_RATIO: f32 = 0.9;
pub const TILE_PADDING: f32 = 4.0;
pub const BORDER_WIDTH: f32 = 1.0;
pub const LABEL_FONT_SIZE: f32 = 8.0;
/// Label offset from the tile's bottom-right corner.
pub const LABEL_INSET_X: f32 = 20.0;
pub const LABEL_INSET_Y: f32 = 15.0;

/// Tile geometry derived from a layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub tile_width: f32,
    pub tile_height: f32,
    pub padding: f32,
}

impl PageGeometry {
    pub fn for_layout(layout: GridLayout) -> Self {
        Self {
            page_width: PAGE_WIDTH,
            page_height: PAGE_HEIGHT,
            tile_width: PAGE_WIDTH / layout.columns() as f32,
            tile_height: GRID_HEIGHT_RATIO * PAGE_HEIGHT / layout.rows() as f32,
            padding: TILE_PADDING,
        }
    }

    /// Full bounds of the tile at `(column, row)`.
    pub fn tile_rect(&self, column: usize, row: usize) -> Rect {
        Rect::new(
            column as f32 * self.tile_width,
            row as f32 * self.tile_height,
            self.tile_width,
            self.tile_height,
        )
    }

    /// Box the image is fit into: the tile inset by the padding.
    pub fn image_box(&self, tile: Rect) -> Rect {
        Rect::new(
            tile.x + self.padding,
            tile.y + self.padding,
            tile.width - 2.0 * self.padding,
            tile.height - 2.0 * self.padding,
        )
    }

    /// Top-left corner of the sequence label.
    pub fn label_origin(&self, tile: Rect) -> (f32, f32) {
        (tile.right() - LABEL_INSET_X, tile.bottom() - LABEL_INSET_Y)
    }
}

/// Where image `index` goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSlot {
    /// 0-based position in the sorted input.
    pub index: usize,
    /// 1-based number printed on the tile.
    pub sequence: usize,
    /// 0-based output page.
    pub page: usize,
    pub column: usize,
    pub row: usize,
}

impl TileSlot {
    pub fn for_index(layout: GridLayout, index: usize) -> Self {
        let columns = layout.columns() as usize;
        let rows = layout.rows() as usize;
        Self {
            index,
            sequence: index + 1,
            page: index / layout.tiles_per_page(),
            column: index % columns,
            row: (index / columns) % rows,
        }
    }

    /// `true` if this tile opens a new page.
    pub fn starts_page(&self, layout: GridLayout) -> bool {
        self.index % layout.tiles_per_page() == 0
    }
}

/// One placed tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilePlacement {
    pub file: String,
    pub slot: TileSlot,
    pub tile: Rect,
    /// Where the image ended up, `None` if it was skipped.
    pub image: Option<Rect>,
    /// How it was drawn, `None` if it was skipped.
    pub fit: Option<ImageFit>,
}

/// What an assembly did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub pages: usize,
    pub placements: Vec<TilePlacement>,
    pub warnings: Vec<PipelineWarning>,
}

/// Result of assembling a directory.
#[derive(Debug)]
pub enum AssemblyOutcome {
    /// No qualifying images; nothing was written.
    Empty,
    Assembled(AssembledDocument),
}

/// Draw `images`, in the given order, onto `canvas`.
///
/// Errors only when the canvas cannot start a page or draw a border or
/// label; image draw failures degrade as described in the module docs.
pub fn assemble_images<C: Canvas>(
    canvas: &mut C,
    images: &[PathBuf],
    layout: GridLayout,
) -> Result<AssemblyReport, PdfGridError> {
    let geometry = PageGeometry::for_layout(layout);
    let mut report = AssemblyReport::default();

    for (index, path) in images.iter().enumerate() {
        let slot = TileSlot::for_index(layout, index);
        if slot.starts_page(layout) {
            canvas.begin_page(geometry.page_width, geometry.page_height)?;
            report.pages += 1;
            debug!("Page {} started", report.pages);
        }

        let file = display_name(path);
        let tile = geometry.tile_rect(slot.column, slot.row);

        let (image, fit) = match canvas.draw_image(path, geometry.image_box(tile), ImageFit::Fit) {
            Ok(drawn) => (Some(drawn), Some(ImageFit::Fit)),
            Err(fit_err) => {
                warn!("Tile {} ('{}'): fit draw failed: {}", slot.sequence, file, fit_err);
                match canvas.draw_image(path, tile, ImageFit::Stretch) {
                    Ok(drawn) => {
                        report.warnings.push(PipelineWarning::FitFallback {
                            sequence: slot.sequence,
                            file: file.clone(),
                            detail: fit_err.to_string(),
                        });
                        (Some(drawn), Some(ImageFit::Stretch))
                    }
                    Err(stretch_err) => {
                        warn!(
                            "Tile {} ('{}'): stretch fallback failed, leaving it empty: {}",
                            slot.sequence, file, stretch_err
                        );
                        report.warnings.push(PipelineWarning::TileSkipped {
                            sequence: slot.sequence,
                            file: file.clone(),
                            detail: stretch_err.to_string(),
                        });
                        (None, None)
                    }
                }
            }
        };

        canvas.stroke_rect(tile, BORDER_WIDTH)?;
        let (label_x, label_y) = geometry.label_origin(tile);
        canvas.draw_text(&slot.sequence.to_string(), label_x, label_y, LABEL_FONT_SIZE)?;

        report.placements.push(TilePlacement {
            file,
            slot,
            tile,
            image,
            fit,
        });
    }

    Ok(report)
}

/// Assemble every qualifying image in `dir` through `backend`. Blocking.
pub fn assemble_dir(
    backend: &dyn DocumentBackend,
    dir: &Path,
    layout: GridLayout,
) -> Result<AssemblyOutcome, PdfGridError> {
    let images = list_raster_files(dir)?;
    if images.is_empty() {
        info!("No final images in '{}', no document produced", dir.display());
        return Ok(AssemblyOutcome::Empty);
    }

    info!(
        "Assembling {} images into a {} grid via {} ({} pages)",
        images.len(),
        layout,
        backend.name(),
        layout.page_count(images.len())
    );
    let document = backend.assemble(&images, layout)?;
    Ok(AssemblyOutcome::Assembled(document))
}
