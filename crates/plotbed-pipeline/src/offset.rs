//! Corner role assignment and inward offset.
//!
//! Each workpiece corner is pushed diagonally toward the interior by a
//! fixed distance along both axes, so the traced path stays on the
//! workpiece instead of running along its edge. The direction depends
//! on the corner's role:
//!
//! | role | position in machine frame | shift  |
//! |------|---------------------------|--------|
//! | 0    | low x, low y              | +x +y  |
//! | 1    | high x, low y             | -x +y  |
//! | 2    | high x, high y            | -x -y  |
//! | 3    | low x, high y             | +x -y  |
//!
//! Roles are assigned from machine coordinates, after mapping, so the
//! shift always points inward regardless of how the camera is mounted
//! relative to the bed axes. Roles 0 to 3 also form a cycle around the
//! quadrilateral, which is the order the motion planner traverses.

use serde::{Deserialize, Serialize};

use crate::types::{MachinePoint, PipelineError};

/// Per-role unit shift directions.
const SIGNS: [(f64, f64); 4] = [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)];

/// Four workpiece corners moved inward, in role order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustedCorners(pub [MachinePoint; 4]);

impl AdjustedCorners {
    /// The corners in role order.
    #[must_use]
    pub const fn points(&self) -> &[MachinePoint; 4] {
        &self.0
    }
}

/// Assign roles 0 to 3 to exactly four mapped corners.
///
/// Sorts by `y`; the lower pair is ordered by ascending `x` (roles 0 and
/// 1), the upper pair by descending `x` (roles 2 and 3).
///
/// # Errors
///
/// Returns [`PipelineError::WrongCornerCount`] unless `corners` holds
/// exactly four points.
pub fn order_corners(corners: &[MachinePoint]) -> Result<[MachinePoint; 4], PipelineError> {
    let mut sorted: [MachinePoint; 4] =
        corners
            .try_into()
            .map_err(|_| PipelineError::WrongCornerCount {
                found: corners.len(),
            })?;

    sorted.sort_by(|a, b| a.y.total_cmp(&b.y));
    let (low, high) = sorted.split_at_mut(2);
    low.sort_by(|a, b| a.x.total_cmp(&b.x));
    high.sort_by(|a, b| b.x.total_cmp(&a.x));
    Ok(sorted)
}

/// Move four role-ordered corners inward by `offset_mm` along both axes.
///
/// # Errors
///
/// Returns [`PipelineError::WrongCornerCount`] unless `corners` holds
/// exactly four points.
pub fn adjust_for_interior(
    corners: &[MachinePoint],
    offset_mm: f64,
) -> Result<AdjustedCorners, PipelineError> {
    let corners: [MachinePoint; 4] =
        corners
            .try_into()
            .map_err(|_| PipelineError::WrongCornerCount {
                found: corners.len(),
            })?;

    let mut adjusted = corners;
    for (point, (sx, sy)) in adjusted.iter_mut().zip(SIGNS) {
        point.x = sx.mul_add(offset_mm, point.x);
        point.y = sy.mul_add(offset_mm, point.y);
    }
    tracing::debug!(?adjusted, offset_mm, "corners adjusted");
    Ok(AdjustedCorners(adjusted))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mp(x: f64, y: f64) -> MachinePoint {
        MachinePoint::new(x, y)
    }

    /// Returns `true` if `p` is strictly inside the convex polygon
    /// `poly` (vertices in cyclic order, either orientation).
    fn strictly_inside(p: MachinePoint, poly: &[MachinePoint; 4]) -> bool {
        let crosses: Vec<f64> = (0..4)
            .map(|i| {
                let a = poly[i];
                let b = poly[(i + 1) % 4];
                (b.x - a.x).mul_add(p.y - a.y, -((b.y - a.y) * (p.x - a.x)))
            })
            .collect();
        crosses.iter().all(|&c| c > 0.0) || crosses.iter().all(|&c| c < 0.0)
    }

    #[test]
    fn roles_follow_machine_geometry() {
        let ordered =
            order_corners(&[mp(200.0, 180.0), mp(60.0, 40.0), mp(55.0, 170.0), mp(210.0, 45.0)])
                .unwrap();
        assert_eq!(
            ordered,
            [mp(60.0, 40.0), mp(210.0, 45.0), mp(200.0, 180.0), mp(55.0, 170.0)]
        );
    }

    #[test]
    fn adjusted_corners_lie_inside_quadrilateral() {
        let quads = [
            [mp(50.0, 50.0), mp(150.0, 50.0), mp(150.0, 120.0), mp(50.0, 120.0)],
            [mp(62.0, 41.0), mp(208.0, 47.0), mp(201.0, 182.0), mp(57.0, 171.0)],
            [mp(90.0, 30.0), mp(180.0, 38.0), mp(170.0, 90.0), mp(85.0, 95.0)],
        ];
        for quad in quads {
            let mut shuffled = quad;
            shuffled.reverse();
            let ordered = order_corners(&shuffled).unwrap();
            let adjusted = adjust_for_interior(&ordered, 5.0).unwrap();
            for p in adjusted.points() {
                assert!(strictly_inside(*p, &ordered), "{p:?} outside {ordered:?}");
            }
        }
    }

    #[test]
    fn zero_offset_is_identity() {
        let corners = [mp(1.0, 2.0), mp(9.0, 2.0), mp(9.0, 8.0), mp(1.0, 8.0)];
        assert_eq!(adjust_for_interior(&corners, 0.0).unwrap().0, corners);
    }

    #[test]
    fn sign_table_applied_per_role() {
        let corners = [mp(0.0, 0.0); 4];
        let adjusted = adjust_for_interior(&corners, 5.0).unwrap();
        assert_eq!(
            adjusted.0,
            [mp(5.0, 5.0), mp(-5.0, 5.0), mp(-5.0, -5.0), mp(5.0, -5.0)]
        );
    }

    #[test]
    fn wrong_corner_count_rejected() {
        let five = [mp(0.0, 0.0); 5];
        assert!(matches!(
            order_corners(&five),
            Err(PipelineError::WrongCornerCount { found: 5 })
        ));
        assert!(matches!(
            adjust_for_interior(&five[..3], 5.0),
            Err(PipelineError::WrongCornerCount { found: 3 })
        ));
    }
}
