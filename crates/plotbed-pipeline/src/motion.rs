//! Fixed four-corner traversal.
//!
//! The planner walks the adjusted corners in role order. Every edge is
//! split into an extruding sub-leg covering the configured share of the
//! edge, followed by a plain travel sub-leg for the remainder. Legs
//! alternate between the even and odd extrusion amounts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::offset::AdjustedCorners;
use crate::types::{MachinePoint, MotionConfig, ToolPosition};

/// One straight move at drawing height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSegment {
    /// Where the move starts (mm).
    pub start: MachinePoint,
    /// Where the move ends (mm).
    pub end: MachinePoint,
    /// Nozzle height (mm).
    pub z: f64,
    /// Feed rate (mm/min).
    pub feed_rate: f64,
    /// Relative extrusion delta, or `None` for a travel move.
    pub extrusion: Option<f64>,
}

impl MotionSegment {
    /// Planar length of the move (mm).
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Returns `true` if material is deposited during the move.
    #[must_use]
    pub const fn is_extruding(&self) -> bool {
        self.extrusion.is_some()
    }
}

/// A single linear move command: target position, feed rate, and an
/// optional extrusion delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Target position and feed rate.
    pub target: ToolPosition,
    /// Relative extrusion delta.
    pub extrusion: Option<f64>,
}

impl Move {
    /// A move without extrusion.
    #[must_use]
    pub const fn travel(target: ToolPosition) -> Self {
        Self {
            target,
            extrusion: None,
        }
    }

    /// Estimated time to complete the move when starting at `from`.
    ///
    /// Acceleration is ignored. Without a known start the estimate is
    /// zero.
    #[must_use]
    pub fn estimated_duration(&self, from: Option<&ToolPosition>) -> Duration {
        let Some(from) = from else {
            return Duration::ZERO;
        };
        let t = &self.target;
        let dx = t.x - from.x;
        let dy = t.y - from.y;
        let dz = t.z - from.z;
        let distance = dx.mul_add(dx, dy.mul_add(dy, dz * dz)).sqrt();
        if t.feed_rate <= 0.0 || !distance.is_finite() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(distance * 60.0 / t.feed_rate)
    }
}

/// The complete traversal: approach, drawing segments, park.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPlan {
    /// Rapid move above the first corner.
    pub approach: ToolPosition,
    /// Drawing segments, extrude and travel alternating per edge.
    pub segments: Vec<MotionSegment>,
    /// Final move clear of the workpiece.
    pub park: ToolPosition,
}

impl MotionPlan {
    /// Flatten the plan into the linear moves sent to the printer.
    #[must_use]
    pub fn moves(&self) -> Vec<Move> {
        let mut moves = Vec::with_capacity(self.segments.len() + 2);
        moves.push(Move::travel(self.approach));
        moves.extend(self.segments.iter().map(|s| Move {
            target: ToolPosition {
                x: s.end.x,
                y: s.end.y,
                z: s.z,
                feed_rate: s.feed_rate,
            },
            extrusion: s.extrusion,
        }));
        moves.push(Move::travel(self.park));
        moves
    }

    /// Total extrusion delta over the plan.
    #[must_use]
    pub fn total_extrusion(&self) -> f64 {
        self.segments.iter().filter_map(|s| s.extrusion).sum()
    }
}

/// Plan the traversal of four adjusted corners.
///
/// Edges 0->1, 1->2, 2->3 are drawn; 3->0 only with `close_loop`.
/// Every edge gets one extrude sub-leg then one travel sub-leg; the
/// split percentage is validated to lie strictly inside (0, 100).
#[must_use]
pub fn plan_traversal(corners: &AdjustedCorners, config: &MotionConfig) -> MotionPlan {
    let points = corners.points();
    let edge_count = if config.close_loop { 4 } else { 3 };
    let fraction = config.extrusion_split_percent / 100.0;

    let mut segments = Vec::with_capacity(edge_count * 2);
    for i in 0..edge_count {
        let start = points[i];
        let end = points[(i + 1) % 4];
        let split = start.lerp(end, fraction);
        let extrusion = if i % 2 == 0 {
            config.extrusion_even
        } else {
            config.extrusion_odd
        };

        segments.push(MotionSegment {
            start,
            end: split,
            z: config.draw_z,
            feed_rate: config.extrude_feed_rate,
            extrusion: Some(extrusion),
        });
        segments.push(MotionSegment {
            start: split,
            end,
            z: config.draw_z,
            feed_rate: config.travel_feed_rate,
            extrusion: None,
        });
    }

    let first = points[0];
    let plan = MotionPlan {
        approach: ToolPosition {
            x: first.x,
            y: first.y,
            z: config.approach_z,
            feed_rate: config.approach_feed_rate,
        },
        segments,
        park: config.park,
    };
    tracing::debug!(
        edges = edge_count,
        segments = plan.segments.len(),
        extrusion = plan.total_extrusion(),
        "traversal planned"
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> AdjustedCorners {
        AdjustedCorners([
            MachinePoint::new(100.0, 50.0),
            MachinePoint::new(200.0, 50.0),
            MachinePoint::new(200.0, 150.0),
            MachinePoint::new(100.0, 150.0),
        ])
    }

    #[test]
    fn three_edges_extrude_then_travel() {
        let plan = plan_traversal(&square(), &MotionConfig::default());
        assert_eq!(plan.segments.len(), 6);
        for pair in plan.segments.chunks(2) {
            assert!(pair[0].is_extruding());
            assert!(!pair[1].is_extruding());
            assert_eq!(pair[0].end, pair[1].start);
            assert!((pair[0].length() - pair[1].length()).abs() < 1e-9);
        }
        // Third edge ends at corner 3; no closing edge.
        assert_eq!(plan.segments[5].end, MachinePoint::new(100.0, 150.0));
    }

    #[test]
    fn extrusion_alternates_between_legs() {
        let plan = plan_traversal(&square(), &MotionConfig::default());
        let amounts: Vec<f64> = plan.segments.iter().filter_map(|s| s.extrusion).collect();
        assert_eq!(amounts, vec![4.0, 2.0, 4.0]);
        assert!((plan.total_extrusion() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn feeds_and_heights_follow_config() {
        let plan = plan_traversal(&square(), &MotionConfig::default());
        for s in &plan.segments {
            assert!((s.z - 6.0).abs() < f64::EPSILON);
            let expected = if s.is_extruding() { 400.0 } else { 200.0 };
            assert!((s.feed_rate - expected).abs() < f64::EPSILON);
        }
        assert_eq!(
            plan.approach,
            ToolPosition {
                x: 100.0,
                y: 50.0,
                z: 10.0,
                feed_rate: 3000.0
            }
        );
        assert_eq!(plan.park, MotionConfig::DEFAULT_PARK);
    }

    #[test]
    fn close_loop_adds_fourth_edge() {
        let config = MotionConfig {
            close_loop: true,
            ..MotionConfig::default()
        };
        let plan = plan_traversal(&square(), &config);
        assert_eq!(plan.segments.len(), 8);
        assert_eq!(plan.segments[7].end, MachinePoint::new(100.0, 50.0));
    }

    #[test]
    fn uneven_split_keeps_both_sub_legs() {
        let config = MotionConfig {
            extrusion_split_percent: 25.0,
            ..MotionConfig::default()
        };
        let plan = plan_traversal(&square(), &config);
        assert_eq!(plan.segments.len(), 6);
        for pair in plan.segments.chunks(2) {
            assert!(pair[0].is_extruding() && !pair[1].is_extruding());
            assert!((pair[0].length() - 25.0).abs() < 1e-9);
            assert!((pair[1].length() - 75.0).abs() < 1e-9);
        }
    }

    #[test]
    fn moves_bracket_segments_with_approach_and_park() {
        let plan = plan_traversal(&square(), &MotionConfig::default());
        let moves = plan.moves();
        assert_eq!(moves.len(), 8);
        assert_eq!(moves[0].target, plan.approach);
        assert_eq!(moves[7].target, plan.park);
        assert_eq!(moves[1].extrusion, Some(4.0));
        assert_eq!(moves[2].extrusion, None);
    }

    #[test]
    fn duration_from_distance_and_feed() {
        let from = ToolPosition {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            feed_rate: 1000.0,
        };
        let m = Move::travel(ToolPosition {
            x: 30.0,
            y: 40.0,
            z: 0.0,
            feed_rate: 600.0,
        });
        // 50 mm at 600 mm/min.
        assert_eq!(m.estimated_duration(Some(&from)), Duration::from_secs(5));
        assert_eq!(m.estimated_duration(None), Duration::ZERO);
    }
}
