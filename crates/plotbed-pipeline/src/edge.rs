//! Canny edge maps for the two detectors.
//!
//! Edge pixels are 255, background 0. The marker detector only
//! configures the upper hysteresis threshold and uses half of it as the
//! lower one, the usual convention for gradient Hough circle detection.
//! The outline detector sets both.

use image::GrayImage;

/// Smallest hysteresis threshold passed to Canny. Lower values turn
/// every pixel with any gradient into an edge.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Edge map with explicit hysteresis thresholds.
///
/// Thresholds below [`MIN_THRESHOLD`] are raised to it, and a lower
/// threshold above the upper one is lowered to match.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    let high = high.max(MIN_THRESHOLD);
    imageproc::edges::canny(image, low.clamp(MIN_THRESHOLD, high), high)
}

/// Edge map for circle voting: the lower threshold is half the upper.
#[must_use = "returns the binary edge map"]
pub fn marker_edges(image: &GrayImage, high: f32) -> GrayImage {
    canny(image, high / 2.0, high)
}

/// Number of edge pixels.
#[must_use]
pub fn edge_pixel_count(edges: &GrayImage) -> u64 {
    edges.pixels().map(|p| u64::from(p.0[0] > 0)).sum()
}
