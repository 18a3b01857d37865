//! Calibration marker detection.
//!
//! Markers are screw heads: small circles of known radius range. The
//! detector runs grayscale -> histogram equalization -> median blur ->
//! gradient Hough circle transform.
//!
//! # Gradient Hough transform
//!
//! Every Canny edge pixel votes along its Sobel gradient direction (both
//! ways, so dark and bright markers are found alike) for every radius in
//! the configured range. Accumulator cells are `dp` pixels wide. Local
//! maxima of the accumulator are scored by the votes in their 3x3
//! neighborhood, refined to the vote-weighted centroid, and accepted
//! greedily (strongest first) when they are at least `min_dist` from
//! every accepted center and enough edge pixels lie on a ring around
//! them. A refined center may sit up to one cell from the true one, so
//! the separation test allows two cells of slack: markers laid out
//! exactly `min_dist` apart are all kept. The radius is the distance at which the most edge pixels sit
//! around the center.

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::blur;
use crate::edge;
use crate::grayscale;
use crate::types::{MarkerDetectorConfig, Point};

/// A detected circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Center in image coordinates.
    pub center: Point,
    /// Estimated radius (pixels).
    pub radius: f64,
    /// Accumulator score (votes in the 3x3 neighborhood of the peak).
    pub votes: u32,
}

/// Detect circular markers in a color image.
///
/// Returns candidates strongest first. The list may hold any number of
/// circles, including none; the caller decides whether the count is
/// usable.
#[must_use]
pub fn detect_markers(image: &RgbaImage, config: &MarkerDetectorConfig) -> Vec<Circle> {
    let gray = grayscale::to_gray(image);
    let equalized = grayscale::equalize(&gray);
    let smoothed = blur::median_blur(&equalized, config.median_kernel);
    let circles = hough_circles(&smoothed, config);
    tracing::debug!(count = circles.len(), "marker candidates");
    circles
}

/// Gradient Hough circle transform on a prepared grayscale image.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn hough_circles(gray: &GrayImage, config: &MarkerDetectorConfig) -> Vec<Circle> {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let edges = edge::marker_edges(gray, config.canny_high);
    let gx = imageproc::gradients::horizontal_sobel(gray);
    let gy = imageproc::gradients::vertical_sobel(gray);

    let dp = config.dp.max(1.0);
    let acc_w = (f64::from(width) / dp).ceil() as usize + 1;
    let acc_h = (f64::from(height) / dp).ceil() as usize + 1;
    let mut acc = vec![0u32; acc_w * acc_h];
    let mut edge_points = Vec::new();

    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        let dx = f64::from(gx.get_pixel(x, y).0[0]);
        let dy = f64::from(gy.get_pixel(x, y).0[0]);
        let magnitude = dx.hypot(dy);
        if magnitude < f64::EPSILON {
            continue;
        }
        let (ux, uy) = (dx / magnitude, dy / magnitude);
        let origin = Point::new(f64::from(x), f64::from(y));
        edge_points.push(origin);

        for sign in [-1.0, 1.0] {
            let mut last_cell = None;
            for r in config.min_radius..=config.max_radius {
                let r = f64::from(r) * sign;
                let cx = ux.mul_add(r, origin.x);
                let cy = uy.mul_add(r, origin.y);
                if cx < 0.0 || cy < 0.0 || cx >= f64::from(width) || cy >= f64::from(height) {
                    break;
                }
                let cell = (cy / dp) as usize * acc_w + (cx / dp) as usize;
                // A ray may cross the same cell twice when dp > 1.
                if last_cell == Some(cell) {
                    continue;
                }
                acc[cell] += 1;
                last_cell = Some(cell);
            }
        }
    }

    let mut peaks = Vec::new();
    for ay in 1..acc_h - 1 {
        for ax in 1..acc_w - 1 {
            let idx = ay * acc_w + ax;
            let v = acc[idx];
            if v == 0 {
                continue;
            }
            let is_peak =
                v > acc[idx - 1] && v >= acc[idx + 1] && v > acc[idx - acc_w] && v >= acc[idx + acc_w];
            if !is_peak {
                continue;
            }
            let (center, votes) = refine_peak(&acc, acc_w, ax, ay, dp);
            if votes >= config.accumulator_threshold {
                peaks.push((center, votes));
            }
        }
    }
    // Stable: equal scores keep raster order.
    peaks.sort_by(|a, b| b.1.cmp(&a.1));

    let separation = (config.min_dist - 2.0 * dp).max(0.0);
    let min_dist_sq = separation * separation;
    let mut circles: Vec<Circle> = Vec::new();
    for (center, votes) in peaks {
        if circles
            .iter()
            .any(|c| c.center.distance_squared(center) < min_dist_sq)
        {
            continue;
        }
        if let Some(radius) = estimate_radius(center, &edge_points, config) {
            circles.push(Circle {
                center,
                radius,
                votes,
            });
        }
    }
    circles
}

/// Vote-weighted centroid and vote total of the 3x3 cells around a peak.
#[allow(clippy::cast_precision_loss)]
fn refine_peak(acc: &[u32], acc_w: usize, ax: usize, ay: usize, dp: f64) -> (Point, u32) {
    let mut total = 0u32;
    let (mut sx, mut sy) = (0.0, 0.0);
    for ny in ay - 1..=ay + 1 {
        for nx in ax - 1..=ax + 1 {
            let v = acc[ny * acc_w + nx];
            total += v;
            sx += f64::from(v) * (nx as f64 + 0.5);
            sy += f64::from(v) * (ny as f64 + 0.5);
        }
    }
    let total_f = f64::from(total.max(1));
    (Point::new(sx / total_f * dp, sy / total_f * dp), total)
}

/// Radius with the most edge-pixel support around `center`.
///
/// Edge pixels are binned by rounded distance; the best radius is the
/// one whose bin and its two neighbours hold the most pixels. Returns
/// `None` when that support covers less than
/// [`MarkerDetectorConfig::min_edge_support`] of the circumference,
/// which rejects vote clusters where straight edges cross.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn estimate_radius(
    center: Point,
    edge_points: &[Point],
    config: &MarkerDetectorConfig,
) -> Option<f64> {
    // One extra bin on each side so the window around the range ends
    // sees its full neighbourhood.
    let lo = config.min_radius.saturating_sub(1);
    let hi = config.max_radius.saturating_add(1);
    let mut histogram = vec![0u32; (hi - lo) as usize + 1];
    for p in edge_points {
        let d = p.distance(center).round();
        if d < f64::from(lo) || d > f64::from(hi) {
            continue;
        }
        histogram[d as usize - lo as usize] += 1;
    }

    let mut best: Option<(u32, u32)> = None;
    for r in config.min_radius..=config.max_radius {
        let i = (r - lo) as usize;
        let window = histogram[i.saturating_sub(1)..=(i + 1).min(histogram.len() - 1)]
            .iter()
            .sum::<u32>();
        if best.is_none_or(|(_, w)| window > w) {
            best = Some((r, window));
        }
    }
    let (radius, support) = best?;
    let circumference = std::f64::consts::TAU * f64::from(radius);
    let coverage = f64::from(support) / circumference;
    if coverage < config.min_edge_support {
        tracing::trace!(?center, radius, coverage, "candidate lacks edge support");
        return None;
    }
    Some(f64::from(radius))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_circle_mut;

    /// Light bed with four dark screw heads.
    fn bed_with_markers(centers: &[(i32, i32)], radius: i32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(400, 300, image::Rgba([200, 200, 200, 255]));
        for &c in centers {
            draw_filled_circle_mut(&mut img, c, radius, image::Rgba([30, 30, 30, 255]));
        }
        img
    }

    fn test_config() -> MarkerDetectorConfig {
        MarkerDetectorConfig::default()
    }

    #[test]
    fn finds_four_markers() {
        // Neighbours sit exactly the default `min_dist` apart.
        let truth = [(100, 50), (300, 50), (100, 250), (300, 250)];
        let img = bed_with_markers(&truth, 8);
        let circles = detect_markers(&img, &test_config());
        assert_eq!(circles.len(), 4, "got {circles:?}");
        for &(tx, ty) in &truth {
            let t = Point::new(f64::from(tx), f64::from(ty));
            let nearest = circles
                .iter()
                .map(|c| c.center.distance(t))
                .fold(f64::INFINITY, f64::min);
            assert!(nearest < 2.0, "no circle near {t:?}: {circles:?}");
        }
        for c in &circles {
            assert!((c.radius - 8.0).abs() <= 2.0, "radius {}", c.radius);
        }
    }

    #[test]
    fn blank_bed_has_no_markers() {
        let img = bed_with_markers(&[], 8);
        assert!(detect_markers(&img, &test_config()).is_empty());
    }

    #[test]
    fn circles_outside_radius_range_are_ignored() {
        let img = bed_with_markers(&[(200, 150)], 40);
        let circles = detect_markers(&img, &test_config());
        assert!(
            circles.iter().all(|c| c.center.distance(Point::new(200.0, 150.0)) > 5.0),
            "large disc should not register as a marker: {circles:?}"
        );
    }

    #[test]
    fn min_dist_suppresses_close_duplicates() {
        let img = bed_with_markers(&[(100, 100), (130, 100)], 8);
        let config = MarkerDetectorConfig {
            min_dist: 50.0,
            ..MarkerDetectorConfig::default()
        };
        let circles = detect_markers(&img, &config);
        assert_eq!(circles.len(), 1, "got {circles:?}");
    }

    #[test]
    fn straight_edges_do_not_form_markers() {
        // Inner corners of a large square gather votes from two edges.
        let mut img = RgbaImage::from_pixel(400, 300, image::Rgba([200, 200, 200, 255]));
        imageproc::drawing::draw_filled_rect_mut(
            &mut img,
            imageproc::rect::Rect::at(120, 80).of_size(160, 140),
            image::Rgba([30, 30, 30, 255]),
        );
        let circles = detect_markers(&img, &test_config());
        assert!(circles.is_empty(), "got {circles:?}");
    }

    #[test]
    fn radius_window_at_type_limit_does_not_overflow() {
        let config = MarkerDetectorConfig {
            min_radius: u32::MAX - 1,
            max_radius: u32::MAX,
            ..MarkerDetectorConfig::default()
        };
        let edges = [Point::new(0.0, 0.0), Point::new(3.0, 4.0)];
        assert!(estimate_radius(Point::new(0.0, 0.0), &edges, &config).is_none());
    }

    #[test]
    fn tiny_image_is_handled() {
        let img = RgbaImage::new(2, 2);
        assert!(detect_markers(&img, &test_config()).is_empty());
    }
}
