//! Staged-image formats: which files qualify and how to write them back.
//!
//! A staged image keeps its file name across every phase, so its format is
//! whatever its extension says. Not every encoder accepts every colour
//! type (JPEG has no alpha, the WebP encoder only takes RGB(A)), so
//! [`write_image`] adapts the pixel layout to the target format first.

use crate::error::PdfGridError;
use image::{ColorType, DynamicImage, ImageFormat};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions a staged image may carry, compared case-insensitively.
pub const RASTER_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// `true` if `path` has an allow-listed raster extension.
pub fn is_raster_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            RASTER_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// List the qualifying image files directly inside `dir`, sorted by file name.
///
/// The sort is the only thing that decides tile order downstream. A missing
/// directory yields an empty list.
pub fn list_raster_files(dir: &Path) -> Result<Vec<PathBuf>, PdfGridError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PdfGridError::StagingIo {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PdfGridError::StagingIo {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && is_raster_file(&path) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("{} qualifying images in '{}'", files.len(), dir.display());
    Ok(files)
}

/// File name of a staged image as a `String`, for logs and errors.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Encode `img` to `path` in the format implied by its extension.
pub fn write_image(img: &DynamicImage, path: &Path) -> Result<(), image::ImageError> {
    let format = ImageFormat::from_path(path)?;
    let adapted = adapt_for(img, format);
    adapted.save_with_format(path, format)
}

fn adapt_for(img: &DynamicImage, format: ImageFormat) -> Cow<'_, DynamicImage> {
    let color = img.color();
    match format {
        ImageFormat::Jpeg if color.has_alpha() || !is_eight_bit(color) => {
            if color.has_color() {
                Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8()))
            } else {
                Cow::Owned(DynamicImage::ImageLuma8(img.to_luma8()))
            }
        }
        ImageFormat::WebP => match color {
            ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(img),
            c if c.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
            _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
        },
        _ => Cow::Borrowed(img),
    }
}

fn is_eight_bit(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8
    )
}
