//! Noise reduction before edge detection.
//!
//! [`gaussian_blur`] wraps [`imageproc::filter::gaussian_blur_f32`] and
//! smooths the workpiece image before the outline is traced.
//! [`median_blur`] wraps [`imageproc::filter::median_filter`] and removes
//! speckle around the small circular markers while keeping their rims
//! sharp.

use image::GrayImage;

/// Apply Gaussian blur to a grayscale image.
///
/// Non-positive sigma values (zero or negative) return the image
/// unchanged, since `imageproc`'s underlying function panics on
/// `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Apply a square median filter with the given odd kernel size.
///
/// A kernel of 1 (or 0) returns the image unchanged.
#[must_use = "returns the filtered image"]
pub fn median_blur(image: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return image.clone();
    }
    let radius = kernel / 2;
    imageproc::filter::median_filter(image, radius, radius)
}
