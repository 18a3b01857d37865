//! Pixel-to-millimetre perspective calibration.
//!
//! Solves the 3x3 projective transform that maps the four ordered
//! marker centers onto their measured machine positions, and applies it
//! to arbitrary image points.
//!
//! The solve is the exact 4-correspondence DLT: with `h22 = 1` the eight
//! remaining entries follow from an 8x8 linear system. Both point sets
//! are Hartley-normalized first (centroid at the origin, mean distance
//! sqrt 2) so pixel and millimetre magnitudes do not skew the
//! conditioning.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::order::OrderedMarkers;
use crate::types::{MachinePoint, MarkerLayout, PipelineError, Point};

/// Smallest accepted triangle area for any three of the four
/// correspondences, relative to the squared spread of the point set.
const MIN_RELATIVE_AREA: f64 = 1e-3;

/// Smallest accepted `|det|` of the normalized linear system.
const MIN_SYSTEM_DETERMINANT: f64 = 1e-9;

/// Smallest accepted homogeneous component relative to the magnitude of
/// the terms it is summed from.
const MIN_RELATIVE_HOMOGENEOUS: f64 = 1e-6;

/// A projective transform from image pixels to machine millimetres.
///
/// Immutable once solved; a new capture solves a new transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveTransform {
    rows: [[f64; 3]; 3],
}

impl PerspectiveTransform {
    /// Wrap a row-major homogeneous matrix.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateCalibration`] if any entry is
    /// not finite or the matrix is singular.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self, PipelineError> {
        let transform = Self { rows };
        let m = transform.matrix();
        if m.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::DegenerateCalibration(
                "transform has non-finite entries".into(),
            ));
        }
        let scale = m.iter().map(|v| v.abs()).fold(0.0, f64::max);
        if scale == 0.0 || m.determinant().abs() <= f64::EPSILON * scale.powi(3) {
            return Err(PipelineError::DegenerateCalibration(
                "transform is singular".into(),
            ));
        }
        Ok(transform)
    }

    /// Row-major matrix entries.
    #[must_use]
    pub const fn rows(&self) -> &[[f64; 3]; 3] {
        &self.rows
    }

    fn matrix(&self) -> Matrix3<f64> {
        let r = &self.rows;
        Matrix3::new(
            r[0][0], r[0][1], r[0][2], //
            r[1][0], r[1][1], r[1][2], //
            r[2][0], r[2][1], r[2][2],
        )
    }

    /// Map one image point to machine coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateMapping`] if the homogeneous
    /// component is (relatively) near zero or the result is not finite.
    pub fn map(&self, point: Point) -> Result<MachinePoint, PipelineError> {
        let r = &self.rows;
        let p = self.matrix() * Vector3::new(point.x, point.y, 1.0);
        let w = p[2];
        let magnitude = (r[2][0] * point.x).abs() + (r[2][1] * point.y).abs() + r[2][2].abs();
        let degenerate = PipelineError::DegenerateMapping {
            x: point.x,
            y: point.y,
            w,
        };
        if !(w.abs() > MIN_RELATIVE_HOMOGENEOUS * magnitude) {
            return Err(degenerate);
        }
        let mapped = MachinePoint::new(p[0] / w, p[1] / w);
        if !(mapped.x.is_finite() && mapped.y.is_finite()) {
            return Err(degenerate);
        }
        Ok(mapped)
    }

    /// Map a sequence of image points, failing on the first degenerate
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateMapping`] for the first point
    /// that cannot be mapped.
    pub fn map_all(&self, points: &[Point]) -> Result<Vec<MachinePoint>, PipelineError> {
        points.iter().map(|&p| self.map(p)).collect()
    }
}

/// Solve the transform mapping `markers[i]` onto `layout[i]`.
///
/// # Errors
///
/// Returns [`PipelineError::DegenerateCalibration`] when three of the
/// four points (in either set) are collinear or coincident, or the
/// linear system is numerically singular.
pub fn solve(
    markers: &OrderedMarkers,
    layout: &MarkerLayout,
) -> Result<PerspectiveTransform, PipelineError> {
    let src: [[f64; 2]; 4] = markers.points().map(|p| [p.x, p.y]);
    let dst: [[f64; 2]; 4] = layout.points().map(|p| [p.x, p.y]);

    check_spread(&src, "image markers")?;
    check_spread(&dst, "marker layout")?;

    let (t_src, src_n) = normalize(&src);
    let (t_dst, dst_n) = normalize(&dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let [x, y] = src_n[i];
        let [u, v] = dst_n[i];
        let (r0, r1) = (2 * i, 2 * i + 1);

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -x * u;
        a[(r0, 7)] = -y * u;
        b[r0] = u;

        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -x * v;
        a[(r1, 7)] = -y * v;
        b[r1] = v;
    }

    let det = a.determinant();
    if !(det.abs() > MIN_SYSTEM_DETERMINANT) {
        return Err(PipelineError::DegenerateCalibration(format!(
            "correspondence system is singular (det = {det:e})"
        )));
    }
    let h = a.lu().solve(&b).ok_or_else(|| {
        PipelineError::DegenerateCalibration("correspondence system has no solution".into())
    })?;

    let h_n = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    let t_dst_inv = t_dst.try_inverse().ok_or_else(|| {
        PipelineError::DegenerateCalibration("layout normalization is not invertible".into())
    })?;
    let mut m = t_dst_inv * h_n * t_src;
    let h22 = m[(2, 2)];
    if h22.abs() > f64::EPSILON {
        m /= h22;
    }

    let rows = [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ];
    let transform = PerspectiveTransform::from_rows(rows)?;
    tracing::debug!(?rows, "solved perspective transform");
    Ok(transform)
}

/// Reject point sets where any three points are (nearly) collinear.
fn check_spread(points: &[[f64; 2]; 4], what: &str) -> Result<(), PipelineError> {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

    // After normalization the mean distance from the centroid is sqrt 2,
    // so areas are directly comparable to MIN_RELATIVE_AREA.
    let (_, normalized) = normalize(points);
    for [i, j, k] in TRIPLES {
        let (a, b, c) = (normalized[i], normalized[j], normalized[k]);
        let area = 0.5 * (b[0] - a[0]).mul_add(c[1] - a[1], -(c[0] - a[0]) * (b[1] - a[1]));
        if !(area.abs() > MIN_RELATIVE_AREA) {
            return Err(PipelineError::DegenerateCalibration(format!(
                "{what}: points {i}, {j}, {k} are collinear or coincident"
            )));
        }
    }
    Ok(())
}

/// Similarity transform moving the centroid to the origin and scaling
/// the mean distance to sqrt 2.
fn normalize(points: &[[f64; 2]; 4]) -> (Matrix3<f64>, [[f64; 2]; 4]) {
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / 4.0;
    let mean_dist = points
        .iter()
        .map(|p| (p[0] - cx).hypot(p[1] - cy))
        .sum::<f64>()
        / 4.0;
    let s = if mean_dist > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    (t, points.map(|p| [s * (p[0] - cx), s * (p[1] - cy)]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn markers() -> OrderedMarkers {
        OrderedMarkers([
            Point::new(100.0, 50.0),
            Point::new(300.0, 50.0),
            Point::new(100.0, 250.0),
            Point::new(300.0, 250.0),
        ])
    }

    fn assert_close(actual: MachinePoint, expected: MachinePoint, tol: f64) {
        assert!(
            actual.distance(expected) < tol,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn markers_map_onto_layout() {
        let transform = solve(&markers(), &MarkerLayout::DEFAULT).unwrap();
        for (m, r) in markers().points().iter().zip(MarkerLayout::DEFAULT.points()) {
            assert_close(transform.map(*m).unwrap(), *r, 1e-3);
        }
    }

    #[test]
    fn round_trip_under_perspective() {
        // Trapezoid in the image: the far edge of the bed looks narrower.
        let image = OrderedMarkers([
            Point::new(130.0, 60.0),
            Point::new(270.0, 62.0),
            Point::new(90.0, 260.0),
            Point::new(312.0, 255.0),
        ]);
        let layout = MarkerLayout([
            MachinePoint::new(0.0, 0.0),
            MachinePoint::new(200.0, 0.0),
            MachinePoint::new(0.0, 200.0),
            MachinePoint::new(200.0, 200.0),
        ]);
        let transform = solve(&image, &layout).unwrap();
        for (m, r) in image.points().iter().zip(layout.points()) {
            assert_close(transform.map(*m).unwrap(), *r, 1e-3);
        }
    }

    #[test]
    fn affine_layout_preserves_midpoints() {
        let layout = MarkerLayout([
            MachinePoint::new(200.0, 20.0),
            MachinePoint::new(100.0, 20.0),
            MachinePoint::new(200.0, 120.0),
            MachinePoint::new(100.0, 120.0),
        ]);
        let transform = solve(&markers(), &layout).unwrap();
        let a = Point::new(120.0, 80.0);
        let b = Point::new(260.0, 210.0);
        let mid = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
        let ma = transform.map(a).unwrap();
        let mb = transform.map(b).unwrap();
        assert_close(transform.map(mid).unwrap(), ma.lerp(mb, 0.5), 1e-6);
    }

    #[test]
    fn default_layout_nearly_preserves_midpoints() {
        let transform = solve(&markers(), &MarkerLayout::DEFAULT).unwrap();
        let a = Point::new(150.0, 100.0);
        let b = Point::new(250.0, 200.0);
        let mid = Point::new(200.0, 150.0);
        let ma = transform.map(a).unwrap();
        let mb = transform.map(b).unwrap();
        assert_close(transform.map(mid).unwrap(), ma.lerp(mb, 0.5), 0.5);
    }

    #[test]
    fn collinear_markers_rejected() {
        let image = OrderedMarkers([
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(100.0, 100.0),
        ]);
        let result = solve(&image, &MarkerLayout::DEFAULT);
        assert!(matches!(
            result,
            Err(PipelineError::DegenerateCalibration(_))
        ));
    }

    #[test]
    fn coincident_markers_rejected() {
        let p = Point::new(150.0, 150.0);
        let image = OrderedMarkers([p, p, Point::new(300.0, 250.0), Point::new(100.0, 250.0)]);
        assert!(solve(&image, &MarkerLayout::DEFAULT).is_err());
    }

    #[test]
    fn collinear_layout_rejected() {
        let layout = MarkerLayout([
            MachinePoint::new(0.0, 0.0),
            MachinePoint::new(10.0, 10.0),
            MachinePoint::new(20.0, 20.0),
            MachinePoint::new(30.0, 30.0),
        ]);
        assert!(matches!(
            solve(&markers(), &layout),
            Err(PipelineError::DegenerateCalibration(_))
        ));
    }

    #[test]
    fn point_on_vanishing_line_is_degenerate() {
        // w = 1 - x / 100 vanishes at x = 100.
        let transform = PerspectiveTransform::from_rows([
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [-0.01, 0.0, 1.0],
        ])
        .unwrap();
        assert!(transform.map(Point::new(50.0, 10.0)).is_ok());
        assert!(matches!(
            transform.map(Point::new(100.0, 10.0)),
            Err(PipelineError::DegenerateMapping { .. })
        ));
    }

    #[test]
    fn singular_matrix_rejected() {
        let result = PerspectiveTransform::from_rows([
            [1.0, 2.0, 3.0],
            [2.0, 4.0, 6.0],
            [0.0, 0.0, 1.0],
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn non_finite_matrix_rejected() {
        let result = PerspectiveTransform::from_rows([
            [f64::NAN, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn map_all_maps_in_order() {
        let transform = solve(&markers(), &MarkerLayout::DEFAULT).unwrap();
        let mapped = transform.map_all(markers().points()).unwrap();
        assert_eq!(mapped.len(), 4);
        assert_close(mapped[3], MachinePoint::new(71.0, 208.0), 1e-3);
    }
}
