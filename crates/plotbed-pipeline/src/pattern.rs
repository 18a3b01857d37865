//! Parameter sweep for extrusion experiments.
//!
//! Eight short test lines are drawn side by side, one per combination of
//! two speeds, two extrusion ratios and two nozzle heights. Each run
//! moves into position, extrudes over one leg length, travels one more
//! leg length without extruding, then lifts. Runs are offset from each
//! other by a fixed step.

use serde::{Deserialize, Serialize};

use crate::motion::Move;
use crate::types::{MachinePoint, PipelineError, ToolPosition};

/// Index triples (speed, ratio, height) in execution order.
pub const RUN_ORDER: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Reachable bed area for the experiment (mm).
///
/// `x` must be at least `min_x`, `y` strictly above `min_y`, both
/// strictly below `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkArea {
    /// Lowest allowed x.
    pub min_x: f64,
    /// Exclusive lower y bound.
    pub min_y: f64,
    /// Exclusive upper bound for both axes.
    pub max: f64,
}

impl Default for WorkArea {
    fn default() -> Self {
        Self {
            min_x: 50.0,
            min_y: 10.0,
            max: 250.0,
        }
    }
}

/// Sweep parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Start of the first run (mm).
    pub start: MachinePoint,
    /// Offset between consecutive runs (mm).
    pub step: MachinePoint,
    /// Length of the extrude leg and of the travel leg (mm).
    pub leg_length: f64,
    /// Feed rates to compare (mm/min).
    pub speeds: [f64; 2],
    /// Extrusion per millimetre of leg.
    pub extrusion_ratios: [f64; 2],
    /// Nozzle heights to compare (mm).
    pub heights: [f64; 2],
    /// Feed rate for positioning and lifting (mm/min).
    pub position_feed_rate: f64,
    /// Height the nozzle lifts to after each run (mm).
    pub lift_z: f64,
    /// Allowed area.
    pub work_area: WorkArea,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            start: MachinePoint::new(100.0, 15.0),
            step: MachinePoint::new(0.0, 10.0),
            leg_length: 50.0,
            speeds: [200.0, 600.0],
            extrusion_ratios: [0.01, 0.75],
            heights: [0.1, 1.0],
            position_feed_rate: 2000.0,
            lift_z: 7.0,
            work_area: WorkArea::default(),
        }
    }
}

impl PatternConfig {
    /// Check that every run stays inside the work area and all feeds
    /// are positive.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violation.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let area = &self.work_area;
        if !(self.leg_length.is_finite() && self.leg_length > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "pattern.leg_length must be positive, got {}",
                self.leg_length
            )));
        }
        for feed in self.speeds.iter().chain([&self.position_feed_rate]) {
            if !(feed.is_finite() && *feed > 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "pattern feed rates must be positive, got {feed}"
                )));
            }
        }
        for (index, origin) in run_origins(self).enumerate() {
            let far_x = 2.0f64.mul_add(self.leg_length, origin.x);
            let inside = origin.x >= area.min_x
                && origin.y > area.min_y
                && origin.x < area.max
                && origin.y < area.max
                && far_x < area.max;
            if !inside {
                return Err(PipelineError::InvalidConfig(format!(
                    "pattern run {index} from ({:.2}, {:.2}) to x {far_x:.2} leaves the work area",
                    origin.x, origin.y
                )));
            }
        }
        Ok(())
    }
}

/// One run of the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRun {
    /// Binary label, speed index first (e.g. `"100"`).
    pub code: String,
    /// Feed rate of both legs (mm/min).
    pub speed: f64,
    /// Extrusion per millimetre.
    pub extrusion_ratio: f64,
    /// Nozzle height (mm).
    pub height: f64,
    /// Where the run starts (mm).
    pub origin: MachinePoint,
    /// Position, extrude, travel, lift.
    pub moves: Vec<Move>,
}

/// The validated sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPlan {
    /// Runs in execution order.
    pub runs: Vec<PatternRun>,
}

impl PatternPlan {
    /// All moves of all runs, in order.
    pub fn moves(&self) -> impl Iterator<Item = &Move> {
        self.runs.iter().flat_map(|r| r.moves.iter())
    }
}

fn run_origins(config: &PatternConfig) -> impl Iterator<Item = MachinePoint> + '_ {
    (0..RUN_ORDER.len()).scan(config.start, |origin, _| {
        let current = *origin;
        origin.x += config.step.x;
        origin.y += config.step.y;
        Some(current)
    })
}

/// Build the eight runs.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if any run leaves the work
/// area; no plan is produced in that case.
pub fn plan_pattern(config: &PatternConfig) -> Result<PatternPlan, PipelineError> {
    config.validate()?;

    let runs: Vec<PatternRun> = RUN_ORDER
        .iter()
        .zip(run_origins(config))
        .map(|(&[si, ri, hi], origin)| {
            let speed = config.speeds[si];
            let ratio = config.extrusion_ratios[ri];
            let height = config.heights[hi];
            let at = |x: f64, z: f64, feed_rate: f64| ToolPosition {
                x,
                y: origin.y,
                z,
                feed_rate,
            };
            let extrude_x = origin.x + config.leg_length;
            let travel_x = 2.0f64.mul_add(config.leg_length, origin.x);
            let moves = vec![
                Move::travel(at(origin.x, height, config.position_feed_rate)),
                Move {
                    target: at(extrude_x, height, speed),
                    extrusion: Some(ratio * config.leg_length),
                },
                Move::travel(at(travel_x, height, speed)),
                Move::travel(at(travel_x, config.lift_z, config.position_feed_rate)),
            ];
            PatternRun {
                code: format!("{si}{ri}{hi}"),
                speed,
                extrusion_ratio: ratio,
                height,
                origin,
                moves,
            }
        })
        .collect();

    tracing::debug!(runs = runs.len(), "pattern planned");
    Ok(PatternPlan { runs })
}
