//! Tonal stages: negate + linear remap, directory to directory.
//!
//! Three stages run back to back. Each one negates every colour channel and
//! then applies `clamp(round(gain × v + offset))`; the first also collapses
//! the image to a single luminance channel beforehand. Rounding and clamping
//! happen at the end of every stage, so the chain is *not* equivalent to a
//! single pre-collapsed remap and must never be rewritten as one.
//!
//! | Stage  | Grayscale | Gain | Offset |
//! |--------|-----------|------|--------|
//! | stage1 | yes       | 1.3  | −50    |
//! | stage2 | no        | 1.2  | −30    |
//! | final  | no        | 1.5  | −30    |
//!
//! Alpha channels pass through untouched.
//!
//! Files inside a stage are independent, so they are transformed on the
//! blocking pool `concurrency` at a time. The stage only returns once every
//! file has finished, which is what makes each stage a barrier.

use crate::error::{PdfGridError, PipelineWarning};
use crate::pipeline::encode::{display_name, list_raster_files, write_image};
use crate::pipeline::staging;
use crate::pipeline::PipelineState;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Parameters of one tonal stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneStage {
    pub name: &'static str,
    /// Convert to single-channel luminance before negating.
    pub grayscale: bool,
    pub gain: f64,
    pub offset: f64,
    /// Delete the source directory once every output has been written.
    pub release_source: bool,
}

pub const STAGE_ONE: ToneStage = ToneStage {
    name: "stage1",
    grayscale: true,
    gain: 1.3,
    offset: -50.0,
    release_source: false,
};

pub const STAGE_TWO: ToneStage = ToneStage {
    name: "stage2",
    grayscale: false,
    gain: 1.2,
    offset: -30.0,
    release_source: false,
};

pub const STAGE_FINAL: ToneStage = ToneStage {
    name: "final",
    grayscale: false,
    gain: 1.5,
    offset: -30.0,
    release_source: true,
};

/// The three stages in pipeline order.
pub const STAGES: [ToneStage; 3] = [STAGE_ONE, STAGE_TWO, STAGE_FINAL];

impl ToneStage {
    /// Negate `v`, then remap it linearly with rounding and clamping.
    pub fn map_value(&self, v: u8) -> u8 {
        // f64 keeps 1.3 · 195 − 50 on its exact .5 tie; f32 lands just below it.
        let negated = f64::from(u8::MAX - v);
        (self.gain * negated + self.offset).round().clamp(0.0, 255.0) as u8
    }

    fn lookup_table(&self) -> [u8; 256] {
        let mut lut = [0u8; 256];
        for (v, slot) in lut.iter_mut().enumerate() {
            *slot = self.map_value(v as u8);
        }
        lut
    }

    /// Apply this stage to a decoded image.
    pub fn apply(&self, img: DynamicImage) -> DynamicImage {
        let img = if self.grayscale { img.grayscale() } else { img };
        let lut = self.lookup_table();

        match to_eight_bit(img) {
            DynamicImage::ImageLuma8(mut buf) => {
                buf.pixels_mut().for_each(|p| p.0[0] = lut[p.0[0] as usize]);
                DynamicImage::ImageLuma8(buf)
            }
            DynamicImage::ImageLumaA8(mut buf) => {
                buf.pixels_mut().for_each(|p| p.0[0] = lut[p.0[0] as usize]);
                DynamicImage::ImageLumaA8(buf)
            }
            DynamicImage::ImageRgb8(mut buf) => {
                buf.pixels_mut()
                    .for_each(|p| p.0.iter_mut().for_each(|c| *c = lut[*c as usize]));
                DynamicImage::ImageRgb8(buf)
            }
            DynamicImage::ImageRgba8(mut buf) => {
                buf.pixels_mut()
                    .for_each(|p| p.0[..3].iter_mut().for_each(|c| *c = lut[*c as usize]));
                DynamicImage::ImageRgba8(buf)
            }
            other => other,
        }
    }

    /// Read `src`, apply the stage and write the result to `dst`.
    pub fn transform_file(&self, src: &Path, dst: &Path) -> Result<(), PdfGridError> {
        let file = display_name(src);
        let img = image::open(src).map_err(|e| PdfGridError::transform(self.name, &file, e))?;
        let out = self.apply(img);
        write_image(&out, dst).map_err(|e| PdfGridError::transform(self.name, &file, e))?;
        debug!("{}: {} → {}", self.name, file, dst.display());
        Ok(())
    }
}

/// Normalise any decoded layout to one of the four 8-bit layouts `apply` handles.
fn to_eight_bit(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => img,
        other => {
            let color = other.color();
            match (color.has_color(), color.has_alpha()) {
                (false, false) => DynamicImage::ImageLuma8(other.to_luma8()),
                (false, true) => DynamicImage::ImageLumaA8(other.to_luma_alpha8()),
                (true, false) => DynamicImage::ImageRgb8(other.to_rgb8()),
                (true, true) => DynamicImage::ImageRgba8(other.to_rgba8()),
            }
        }
    }
}

/// What a stage did.
#[derive(Debug, Default)]
pub struct StageReport {
    /// Images written to the destination directory.
    pub files: usize,
    /// Non-fatal problems clearing the destination or releasing the source.
    pub warnings: Vec<PipelineWarning>,
}

/// Run `stage` over every qualifying image in `src`, writing to `dst`.
///
/// `dst` is created and emptied first, even when `src` holds nothing to
/// transform. The first per-file failure is returned after all in-flight
/// files have settled.
pub async fn run_stage(
    stage: ToneStage,
    src: &Path,
    dst: &Path,
    concurrency: usize,
    phase: PipelineState,
    progress: Option<ProgressCallback>,
) -> Result<StageReport, PdfGridError> {
    staging::ensure(dst)?;
    let mut report = StageReport {
        files: 0,
        warnings: staging::clear(dst),
    };

    let inputs = list_raster_files(src)?;
    let total = inputs.len();
    if total == 0 {
        info!("{}: no images in '{}', nothing to do", stage.name, src.display());
        if stage.release_source {
            report.warnings.extend(staging::remove_all(src));
        }
        return Ok(report);
    }
    info!("{}: transforming {} images", stage.name, total);

    let jobs = inputs.into_iter().map(|input| {
        let output: PathBuf = dst.join(input.file_name().unwrap_or_default());
        async move {
            let name = display_name(&input);
            let result = tokio::task::spawn_blocking(move || stage.transform_file(&input, &output))
                .await
                .map_err(|e| PdfGridError::Internal(format!("Transform task panicked: {}", e)))
                .and_then(|r| r);
            (name, result)
        }
    });

    let mut results = stream::iter(jobs).buffer_unordered(concurrency.max(1));
    let mut first_error: Option<PdfGridError> = None;

    while let Some((name, result)) = results.next().await {
        match result {
            Ok(()) => {
                report.files += 1;
                if let Some(ref cb) = progress {
                    cb.on_file_complete(phase, &name, report.files, total);
                }
            }
            Err(e) => {
                warn!("{}: '{}' failed: {}", stage.name, name, e);
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    if stage.release_source {
        report.warnings.extend(staging::remove_all(src));
    }

    Ok(report)
}
