//! G-code serializer.
//!
//! Every move becomes one linear `G1` command carrying all three axes
//! and the feed rate, plus an `E` word when the move extrudes:
//!
//! ```text
//! G1 X127.35 Y81.20 Z6 F400 E4
//! ```
//!
//! X and Y are printed with a fixed number of decimals. Z, F and E are
//! printed in their shortest form after rounding to four decimals.
//! Extrusion is relative, so [`setup_commands`] switches the extruder to
//! relative mode (`M83`).
//!
//! This is a pure module with no I/O: it returns strings.

use std::fmt::Write;

use plotbed_pipeline::pattern::PatternPlan;
use plotbed_pipeline::{MotionPlan, Move, ToolPosition};

/// Formatting options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcodeOptions {
    /// Decimals for X and Y.
    pub coordinate_decimals: usize,
}

impl Default for GcodeOptions {
    fn default() -> Self {
        Self {
            coordinate_decimals: 2,
        }
    }
}

/// Metadata emitted as `;` comment lines at the top of a program file.
///
/// All fields are optional. Firmware ignores comment lines.
#[derive(Debug, Clone, Default)]
pub struct GcodeMetadata<'a> {
    /// Source image or run name, emitted as `; Source: <title>`.
    pub title: Option<&'a str>,
    /// Free text, one comment line per text line.
    pub description: Option<&'a str>,
    /// Configuration JSON, emitted as `; Config: <json>`.
    pub config_json: Option<&'a str>,
}

/// Commands sent once after connecting: home all axes, set the extruder
/// steps per millimetre, switch to relative extrusion.
#[must_use]
pub fn setup_commands() -> Vec<String> {
    ["G28", "M92 E4000 T0", "M83"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Round to four decimals and print without trailing zeros.
fn short(value: f64) -> String {
    let rounded = (value * 1e4).round() / 1e4;
    // Avoid printing "-0".
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded}")
}

/// Format a single move.
#[must_use]
pub fn format_move(mv: &Move, options: &GcodeOptions) -> String {
    let t = &mv.target;
    let d = options.coordinate_decimals;
    let mut line = format!(
        "G1 X{:.d$} Y{:.d$} Z{} F{}",
        t.x,
        t.y,
        short(t.z),
        short(t.feed_rate)
    );
    if let Some(e) = mv.extrusion {
        let _ = write!(line, " E{}", short(e));
    }
    line
}

/// Format a sequence of moves, one command per move.
#[must_use]
pub fn moves_to_gcode<'a>(
    moves: impl IntoIterator<Item = &'a Move>,
    options: &GcodeOptions,
) -> Vec<String> {
    moves
        .into_iter()
        .map(|mv| format_move(mv, options))
        .collect()
}

/// The park move for `position`.
#[must_use]
pub fn park_command(position: &ToolPosition, options: &GcodeOptions) -> String {
    format_move(&Move::travel(*position), options)
}

/// Approach, drawing segments and park of a traversal, in order.
#[must_use]
pub fn plan_to_gcode(plan: &MotionPlan, options: &GcodeOptions) -> Vec<String> {
    moves_to_gcode(&plan.moves(), options)
}

/// All runs of an extrusion sweep, in order.
#[must_use]
pub fn pattern_to_gcode(plan: &PatternPlan, options: &GcodeOptions) -> Vec<String> {
    moves_to_gcode(plan.moves(), options)
}

/// Assemble a program file: metadata comments, then one command per
/// line.
#[must_use]
pub fn to_program(commands: &[String], metadata: &GcodeMetadata<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; plotbed");
    if let Some(title) = metadata.title {
        for line in title.lines() {
            let _ = writeln!(out, "; Source: {line}");
        }
    }
    if let Some(description) = metadata.description {
        for line in description.lines() {
            let _ = writeln!(out, "; {line}");
        }
    }
    if let Some(config_json) = metadata.config_json {
        for line in config_json.lines() {
            let _ = writeln!(out, "; Config: {line}");
        }
    }
    for command in commands {
        let _ = writeln!(out, "{command}");
    }
    out
}
