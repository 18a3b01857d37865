//! Image decoding, grayscale conversion and contrast equalization.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) as delivered by the
//! webcam snapshot endpoint. Both detectors work on a single-channel
//! image; the color original is kept for annotated diagnostics.

use image::{GrayImage, RgbaImage};

use crate::types::PipelineError;

/// Decode raw image bytes into an RGBA image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Convert an RGBA image to grayscale using the standard luminance
/// weights.
#[must_use = "returns the grayscale image"]
pub fn to_gray(image: &RgbaImage) -> GrayImage {
    image::DynamicImage::ImageRgba8(image.clone()).to_luma8()
}

/// Spread the intensity histogram over the full `0..=255` range.
///
/// Markers are small and often low-contrast under bed lighting;
/// equalizing first keeps the detector thresholds meaningful across
/// exposures.
#[must_use = "returns the equalized image"]
pub fn equalize(image: &GrayImage) -> GrayImage {
    imageproc::contrast::equalize_histogram(image)
}
