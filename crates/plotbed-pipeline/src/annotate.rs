//! Diagnostic overlays for captured images.
//!
//! The operator inspects these before letting the printer move, so they
//! only need to be legible, not pretty.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};

use crate::marker::Circle;
use crate::types::Point;

const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Radius of the red corner dot (pixels).
const CORNER_DOT_RADIUS: i32 = 5;
/// Spacing between index ticks (pixels).
const TICK_SPACING: i32 = 6;

#[allow(clippy::cast_possible_truncation)]
fn pixel(p: Point) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

/// Copy of `image` with each circle outlined in blue and its center
/// marked in green.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn annotate_markers(image: &RgbaImage, circles: &[Circle]) -> RgbaImage {
    let mut out = image.clone();
    for circle in circles {
        let center = pixel(circle.center);
        let radius = circle.radius.round().max(1.0) as i32;
        draw_hollow_circle_mut(&mut out, center, radius, BLUE);
        draw_hollow_circle_mut(&mut out, center, radius + 1, BLUE);
        draw_filled_circle_mut(&mut out, center, 2, GREEN);
    }
    out
}

/// Copy of `image` with a red dot on each corner and `i + 1` white
/// ticks beside corner `i`.
#[must_use]
pub fn annotate_corners(image: &RgbaImage, corners: &[Point]) -> RgbaImage {
    let mut out = image.clone();
    for (i, &corner) in corners.iter().enumerate() {
        let (cx, cy) = pixel(corner);
        draw_filled_circle_mut(&mut out, (cx, cy), CORNER_DOT_RADIUS, RED);
        let ticks = i32::try_from(i + 1).unwrap_or(i32::MAX);
        for t in 0..ticks {
            let tick = (cx + CORNER_DOT_RADIUS + 4 + t * TICK_SPACING, cy);
            draw_filled_circle_mut(&mut out, tick, 1, WHITE);
        }
    }
    out
}
