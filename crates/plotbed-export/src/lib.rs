//! plotbed-export: pure format serializers (sans-IO).
//!
//! Converts motion plans into G-code lines for the printer and into an
//! SVG preview in machine millimetres.

pub mod gcode;
pub mod svg;

pub use gcode::{
    GcodeMetadata, GcodeOptions, format_move, moves_to_gcode, park_command, pattern_to_gcode,
    plan_to_gcode, setup_commands, to_program,
};
pub use svg::{SvgMetadata, plan_to_svg};
