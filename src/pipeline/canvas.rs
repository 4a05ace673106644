//! Drawing surface for the grid assembler.
//!
//! The assembler only needs five operations: start a page, draw an image
//! (fit or stretch), stroke a rectangle, draw a short text, and serialise the
//! result. [`Canvas`] captures exactly that. Coordinates are in points with
//! the origin at the **top-left** of the page; [`PdfiumCanvas`] flips them
//! into PDF's bottom-left space at the boundary.
//!
//! A [`DocumentBackend`] owns the lifetime of a canvas for one assembly:
//! [`PdfiumBackend`] writes a real PDF, [`LayoutRecorder`] writes the list of
//! draw operations as JSON, which is what `--plan` and the tests use.

use crate::config::GridLayout;
use crate::error::PdfGridError;
use crate::pipeline::encode::display_name;
use crate::pipeline::grid::{self, AssemblyReport};
use crate::pipeline::render::bind_pdfium;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Axis-aligned rectangle in points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Largest rectangle with the aspect ratio of a `width`×`height` image
    /// that fits inside `self`, anchored at `self`'s top-left corner.
    ///
    /// `None` when the image or the box is degenerate.
    pub fn fit(&self, width: u32, height: u32) -> Option<Rect> {
        if width == 0 || height == 0 || self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        let scale = (self.width / width as f32).min(self.height / height as f32);
        Some(Rect::new(
            self.x,
            self.y,
            width as f32 * scale,
            height as f32 * scale,
        ))
    }
}

/// How an image is sized into its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFit {
    /// Scale preserving aspect ratio until it touches the bounds.
    Fit,
    /// Scale each axis independently to exactly fill the bounds.
    Stretch,
}

/// A page canvas the grid assembler draws on.
pub trait Canvas {
    /// Start a new page; later draws go to it.
    fn begin_page(&mut self, width: f32, height: f32) -> Result<(), PdfGridError>;

    /// Draw the image at `path` into `bounds`, returning the rectangle it
    /// actually occupies.
    fn draw_image(&mut self, path: &Path, bounds: Rect, fit: ImageFit) -> Result<Rect, PdfGridError>;

    /// Stroke the outline of `rect`.
    fn stroke_rect(&mut self, rect: Rect, line_width: f32) -> Result<(), PdfGridError>;

    /// Draw `text` with its top-left corner at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> Result<(), PdfGridError>;

    /// Serialise everything drawn so far.
    fn finish(self) -> Result<Vec<u8>, PdfGridError>
    where
        Self: Sized;
}

fn placed_rect(bounds: Rect, fit: ImageFit, width: u32, height: u32) -> Result<Rect, PdfGridError> {
    match fit {
        ImageFit::Stretch => Ok(bounds),
        ImageFit::Fit => bounds.fit(width, height).ok_or_else(|| {
            PdfGridError::CanvasFailed(format!(
                "cannot fit a {width}x{height} image into {:.1}x{:.1}",
                bounds.width, bounds.height
            ))
        }),
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

fn pdfium_err(context: &'static str) -> impl Fn(PdfiumError) -> PdfGridError {
    move |e| PdfGridError::CanvasFailed(format!("{context}: {e:?}"))
}

/// Canvas writing a real PDF through pdfium-render.
pub struct PdfiumCanvas<'a> {
    // Declared first so the open page is dropped before its document.
    page: Option<PdfPage<'a>>,
    document: PdfDocument<'a>,
    page_height: f32,
    font: PdfFontToken,
}

impl<'a> PdfiumCanvas<'a> {
    pub fn new(pdfium: &'a Pdfium) -> Result<Self, PdfGridError> {
        let mut document = pdfium
            .create_new_pdf()
            .map_err(pdfium_err("creating document"))?;
        let font = document.fonts_mut().helvetica();
        Ok(Self {
            page: None,
            document,
            page_height: 0.0,
            font,
        })
    }

    fn page(&mut self) -> Result<&mut PdfPage<'a>, PdfGridError> {
        self.page
            .as_mut()
            .ok_or_else(|| PdfGridError::CanvasFailed("draw before begin_page".into()))
    }

    /// PDF y coordinate of the bottom edge of a top-left-origin box.
    fn flip(&self, top: f32, height: f32) -> f32 {
        self.page_height - top - height
    }
}

impl Canvas for PdfiumCanvas<'_> {
    fn begin_page(&mut self, width: f32, height: f32) -> Result<(), PdfGridError> {
        // Dropping the previous page regenerates its content stream.
        self.page = None;
        let page = self
            .document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(width),
                PdfPoints::new(height),
            ))
            .map_err(pdfium_err("creating page"))?;
        self.page = Some(page);
        self.page_height = height;
        Ok(())
    }

    fn draw_image(&mut self, path: &Path, bounds: Rect, fit: ImageFit) -> Result<Rect, PdfGridError> {
        let img = image::open(path).map_err(|e| {
            PdfGridError::CanvasFailed(format!("decoding '{}': {e}", display_name(path)))
        })?;
        let rect = placed_rect(bounds, fit, img.width(), img.height())?;
        let y = self.flip(rect.y, rect.height);
        self.page()?
            .objects_mut()
            .create_image_object(
                PdfPoints::new(rect.x),
                PdfPoints::new(y),
                &img,
                Some(PdfPoints::new(rect.width)),
                Some(PdfPoints::new(rect.height)),
            )
            .map_err(pdfium_err("placing image"))?;
        Ok(rect)
    }

    fn stroke_rect(&mut self, rect: Rect, line_width: f32) -> Result<(), PdfGridError> {
        let bottom = self.flip(rect.y, rect.height);
        self.page()?
            .objects_mut()
            .create_path_object_rect(
                PdfRect::new_from_values(bottom, rect.x, bottom + rect.height, rect.right()),
                Some(PdfColor::new(0, 0, 0, 255)),
                Some(PdfPoints::new(line_width)),
                None,
            )
            .map_err(pdfium_err("stroking rectangle"))?;
        Ok(())
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> Result<(), PdfGridError> {
        let baseline = self.flip(y, font_size);
        let font = self.font;
        self.page()?
            .objects_mut()
            .create_text_object(
                PdfPoints::new(x),
                PdfPoints::new(baseline),
                text,
                font,
                PdfPoints::new(font_size),
            )
            .map_err(pdfium_err("drawing text"))?;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, PdfGridError> {
        self.page = None;
        self.document
            .save_to_bytes()
            .map_err(pdfium_err("serialising document"))
    }
}

// ── recording ────────────────────────────────────────────────────────────

/// One recorded drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    BeginPage {
        width: f32,
        height: f32,
    },
    Image {
        file: String,
        bounds: Rect,
        drawn: Rect,
        fit: ImageFit,
    },
    StrokeRect {
        rect: Rect,
        line_width: f32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        font_size: f32,
    },
}

/// Canvas that records operations instead of rendering them.
///
/// Fit draws read the image header for its dimensions; stretch draws only
/// require the file to exist. `finish` serialises the operations as JSON.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<DrawOp> {
        self.ops
    }

    fn has_page(&self) -> Result<(), PdfGridError> {
        match self.ops.first() {
            Some(DrawOp::BeginPage { .. }) => Ok(()),
            _ => Err(PdfGridError::CanvasFailed("draw before begin_page".into())),
        }
    }
}

impl Canvas for RecordingCanvas {
    fn begin_page(&mut self, width: f32, height: f32) -> Result<(), PdfGridError> {
        self.ops.push(DrawOp::BeginPage { width, height });
        Ok(())
    }

    fn draw_image(&mut self, path: &Path, bounds: Rect, fit: ImageFit) -> Result<Rect, PdfGridError> {
        self.has_page()?;
        let file = display_name(path);
        let drawn = match fit {
            ImageFit::Fit => {
                let (w, h) = image::image_dimensions(path)
                    .map_err(|e| PdfGridError::CanvasFailed(format!("reading '{file}': {e}")))?;
                placed_rect(bounds, fit, w, h)?
            }
            ImageFit::Stretch => {
                if !path.is_file() {
                    return Err(PdfGridError::CanvasFailed(format!("'{file}' is missing")));
                }
                bounds
            }
        };
        self.ops.push(DrawOp::Image {
            file,
            bounds,
            drawn,
            fit,
        });
        Ok(drawn)
    }

    fn stroke_rect(&mut self, rect: Rect, line_width: f32) -> Result<(), PdfGridError> {
        self.has_page()?;
        self.ops.push(DrawOp::StrokeRect { rect, line_width });
        Ok(())
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> Result<(), PdfGridError> {
        self.has_page()?;
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            x,
            y,
            font_size,
        });
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, PdfGridError> {
        serde_json::to_vec_pretty(&self.ops)
            .map_err(|e| PdfGridError::Internal(format!("serialising layout: {e}")))
    }
}

// ── backends ─────────────────────────────────────────────────────────────

/// A serialised output document plus what went into it.
#[derive(Debug)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub report: AssemblyReport,
}

/// Produces an output document from a sorted list of final images.
pub trait DocumentBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// File extension of the documents this backend writes.
    fn extension(&self) -> &'static str;

    /// Tile `images` (already sorted, never empty) into a document. Blocking.
    fn assemble(&self, images: &[PathBuf], layout: GridLayout) -> Result<AssembledDocument, PdfGridError>;
}

/// Writes PDFs through pdfium-render.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumBackend;

impl DocumentBackend for PdfiumBackend {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn assemble(&self, images: &[PathBuf], layout: GridLayout) -> Result<AssembledDocument, PdfGridError> {
        let pdfium = bind_pdfium()?;
        let mut canvas = PdfiumCanvas::new(&pdfium)?;
        let report = grid::assemble_images(&mut canvas, images, layout)?;
        let bytes = canvas.finish()?;
        Ok(AssembledDocument { bytes, report })
    }
}

/// Writes the recorded draw operations as JSON instead of a PDF.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutRecorder;

impl DocumentBackend for LayoutRecorder {
    fn name(&self) -> &'static str {
        "layout-recorder"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn assemble(&self, images: &[PathBuf], layout: GridLayout) -> Result<AssembledDocument, PdfGridError> {
        let mut canvas = RecordingCanvas::new();
        let report = grid::assemble_images(&mut canvas, images, layout)?;
        let bytes = canvas.finish()?;
        Ok(AssembledDocument { bytes, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn fit_preserves_aspect_ratio() {
        let bounds = Rect::new(10.0, 20.0, 100.0, 100.0);
        let wide = bounds.fit(400, 200).unwrap();
        assert_eq!(wide, Rect::new(10.0, 20.0, 100.0, 50.0));
        let tall = bounds.fit(100, 400).unwrap();
        assert_eq!(tall, Rect::new(10.0, 20.0, 25.0, 100.0));
    }

    #[test]
    fn fit_scales_small_images_up_to_the_box() {
        let fitted = Rect::new(0.0, 0.0, 50.0, 80.0).fit(5, 5).unwrap();
        assert_eq!((fitted.width, fitted.height), (50.0, 50.0));
    }

    #[test]
    fn fit_rejects_degenerate_input() {
        assert!(Rect::new(0.0, 0.0, 10.0, 10.0).fit(0, 5).is_none());
        assert!(Rect::new(0.0, 0.0, 0.0, 10.0).fit(5, 5).is_none());
    }

    #[test]
    fn recorder_requires_a_page() {
        let mut canvas = RecordingCanvas::new();
        assert!(canvas.stroke_rect(Rect::new(0.0, 0.0, 1.0, 1.0), 1.0).is_err());
        canvas.begin_page(595.0, 842.0).unwrap();
        assert!(canvas.stroke_rect(Rect::new(0.0, 0.0, 1.0, 1.0), 1.0).is_ok());
    }

    #[test]
    fn recorder_fit_and_stretch() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.png");
        RgbImage::from_pixel(20, 10, Rgb([1, 2, 3])).save(&good).unwrap();
        let bad = tmp.path().join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();

        let mut canvas = RecordingCanvas::new();
        canvas.begin_page(595.0, 842.0).unwrap();
        let bounds = Rect::new(0.0, 0.0, 40.0, 40.0);

        let drawn = canvas.draw_image(&good, bounds, ImageFit::Fit).unwrap();
        assert_eq!(drawn, Rect::new(0.0, 0.0, 40.0, 20.0));
        assert!(canvas.draw_image(&bad, bounds, ImageFit::Fit).is_err());
        assert_eq!(canvas.draw_image(&bad, bounds, ImageFit::Stretch).unwrap(), bounds);
        assert!(canvas
            .draw_image(&tmp.path().join("gone.png"), bounds, ImageFit::Stretch)
            .is_err());
    }

    #[test]
    fn recorded_ops_serialise_as_tagged_json() {
        let mut canvas = RecordingCanvas::new();
        canvas.begin_page(595.0, 842.0).unwrap();
        canvas.draw_text("1", 277.5, 174.45, 8.0).unwrap();
        let bytes = canvas.finish().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[0]["op"], "begin_page");
        assert_eq!(value[1]["op"], "text");
        assert_eq!(value[1]["text"], "1");
    }
}
