//! Workpiece outline detection.
//!
//! grayscale -> Gaussian blur -> Canny -> gap closing -> external
//! contours -> largest enclosed area -> closed polygon approximation.
//!
//! Border following runs on the binary edge map via
//! [`imageproc::contours::find_contours`]. Only outer borders without a
//! parent are considered, so holes and nested shapes inside the
//! workpiece never win the area comparison.

use image::{GrayImage, RgbaImage};
use imageproc::contours::BorderType;
use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

use crate::blur;
use crate::edge;
use crate::grayscale;
use crate::simplify;
use crate::types::{ContourConfig, PipelineError, Point};

/// Polygon approximating the workpiece outline, in image coordinates.
///
/// Vertices follow the border-following order; the count depends on the
/// shape and noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerPolygon(pub Vec<Point>);

impl CornerPolygon {
    /// The polygon vertices.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the polygon has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Find the workpiece outline in a color image.
///
/// # Errors
///
/// Returns [`PipelineError::NoContours`] if edge detection yields no
/// external contour.
pub fn detect_outline(
    image: &RgbaImage,
    config: &ContourConfig,
) -> Result<CornerPolygon, PipelineError> {
    let gray = grayscale::to_gray(image);
    let blurred = blur::gaussian_blur(&gray, config.blur_sigma);
    let edges = edge::canny(&blurred, config.canny_low, config.canny_high);
    let closed = close_gaps(&edges);

    let contours = external_contours(&closed);
    tracing::debug!(count = contours.len(), "external contours");

    let largest = contours
        .into_iter()
        .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)))
        .ok_or(PipelineError::NoContours)?;

    let epsilon = config.epsilon_fraction * simplify::perimeter(&largest, true);
    let polygon = simplify::simplify_closed(&largest, epsilon);
    tracing::debug!(
        border_points = largest.len(),
        vertices = polygon.len(),
        epsilon,
        "outline approximated"
    );
    Ok(CornerPolygon(polygon))
}

/// Dilate the edge map by one pixel so corners thinned apart by
/// non-maximum suppression still form closed loops.
#[must_use]
pub fn close_gaps(edges: &GrayImage) -> GrayImage {
    imageproc::morphology::dilate(edges, Norm::LInf, 1)
}

/// Outer borders with no enclosing border, as point lists.
#[must_use]
pub fn external_contours(edges: &GrayImage) -> Vec<Vec<Point>> {
    imageproc::contours::find_contours::<u32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| c.points.len() >= 3)
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect()
        })
        .collect()
}

/// Unsigned area enclosed by a closed polygon (shoelace formula).
#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x.mul_add(b.y, -(b.x * a.y))
        })
        .sum();
    twice.abs() / 2.0
}
