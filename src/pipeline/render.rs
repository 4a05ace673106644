//! PDF rasterisation: one PNG per page in the `rasterized` staging directory.
//!
//! The [`Rasterizer`] trait is the seam between the pipeline and whatever
//! turns a document into page images. [`PdfiumRasterizer`] is the default.
//!
//! ## Why spawn_blocking?
//!
//! pdfium uses thread-local state internally and is not safe to call from
//! async contexts. Callers run [`Rasterizer::rasterize`] inside
//! `tokio::task::spawn_blocking` so Tokio worker threads never stall on it.
//!
//! ## File naming
//!
//! Pages are written as `page-0001.png`, `page-0002.png`, … with at least
//! four digits (more for longer documents), so lexical order of the file
//! names equals page order. Every later phase relies on that.

use crate::config::PipelineConfig;
use crate::error::PdfGridError;
use crate::output::DocumentInfo;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a source document into one image per page.
pub trait Rasterizer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Write one image per page of `source` into `target_dir` and return the
    /// page count. Blocking.
    fn rasterize(&self, source: &Path, target_dir: &Path) -> Result<usize, PdfGridError>;
}

/// Bind to a pdfium shared library.
///
/// Resolution order: `PDFIUM_LIB_PATH`, then the current working directory,
/// then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, PdfGridError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(path) => Pdfium::bind_to_library(PathBuf::from(path)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PdfGridError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// Open `pdf_path`, mapping pdfium's errors onto the input error variants.
fn load_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, PdfGridError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                PdfGridError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                PdfGridError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            PdfGridError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// File name of the `index`-th page (0-based) in a document of `total` pages.
pub fn page_file_name(index: usize, total: usize) -> String {
    let width = total.to_string().len().max(4);
    format!("page-{:0width$}.png", index + 1, width = width)
}

/// Rasteriser backed by pdfium-render.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_rendered_pixels,
            password,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_rendered_pixels, config.password.clone())
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn rasterize(&self, source: &Path, target_dir: &Path) -> Result<usize, PdfGridError> {
        let pdfium = bind_pdfium()?;
        let document = load_document(&pdfium, source, self.password.as_deref())?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| PdfGridError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                PdfGridError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let path = target_dir.join(page_file_name(idx, total_pages));
            image
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|e| PdfGridError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("Writing '{}' failed: {}", path.display(), e),
                })?;

            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
        }

        Ok(total_pages)
    }
}

/// Read page count and basic metadata without rendering anything. Blocking.
pub fn document_info(pdf_path: &Path, password: Option<&str>) -> Result<DocumentInfo, PdfGridError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_names_sort_in_page_order() {
        let mut names: Vec<String> = (0..12).map(|i| page_file_name(i, 12)).collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
        assert_eq!(page_file_name(0, 3), "page-0001.png");
    }

    #[test]
    fn page_names_widen_for_long_documents() {
        assert_eq!(page_file_name(0, 12_345), "page-00001.png");
        assert_eq!(page_file_name(12_344, 12_345), "page-12345.png");
    }

    #[test]
    fn rasterizer_reports_its_name() {
        let r = PdfiumRasterizer::new(800, None);
        assert_eq!(r.name(), "pdfium");
    }
}
