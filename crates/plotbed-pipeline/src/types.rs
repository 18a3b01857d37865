//! Shared types for the plotbed coordinate pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can persist annotated
/// diagnostics without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// A 2D point in the printer's coordinate frame, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachinePoint {
    /// X axis position (mm).
    pub x: f64,
    /// Y axis position (mm).
    pub y: f64,
}

impl MachinePoint {
    /// Create a new machine point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point (mm).
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Point at fraction `t` of the way from `self` to `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            (other.x - self.x).mul_add(t, self.x),
            (other.y - self.y).mul_add(t, self.y),
        )
    }
}

/// A full tool head position with the feed rate used to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolPosition {
    /// X axis position (mm).
    pub x: f64,
    /// Y axis position (mm).
    pub y: f64,
    /// Z axis position (mm).
    pub z: f64,
    /// Feed rate (mm/min).
    pub feed_rate: f64,
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Real-world marker positions, index-aligned with
/// [`OrderedMarkers`](crate::order::OrderedMarkers):
/// top-left, top-right, bottom-left, bottom-right as seen by the camera.
///
/// Measured once per printer and jig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerLayout(pub [MachinePoint; 4]);

impl MarkerLayout {
    /// Screw positions of the reference jig.
    pub const DEFAULT: Self = Self([
        MachinePoint::new(242.0, 38.0),
        MachinePoint::new(72.0, 38.0),
        MachinePoint::new(242.0, 210.0),
        MachinePoint::new(71.0, 208.0),
    ]);

    /// The positions as a slice.
    #[must_use]
    pub const fn points(&self) -> &[MachinePoint; 4] {
        &self.0
    }
}

impl Default for MarkerLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Parameters of the gradient Hough circle detector used to find markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerDetectorConfig {
    /// Median filter kernel size (odd). 1 disables the filter.
    pub median_kernel: u32,
    /// Inverse accumulator resolution: 1.0 votes per pixel, 2.0 votes
    /// into cells twice as large.
    pub dp: f64,
    /// Minimum distance between detected centers (pixels).
    pub min_dist: f64,
    /// High Canny threshold; the low threshold is half of it.
    pub canny_high: f32,
    /// Minimum accumulator votes for a center candidate.
    pub accumulator_threshold: u32,
    /// Smallest accepted radius (pixels).
    pub min_radius: u32,
    /// Largest accepted radius (pixels).
    pub max_radius: u32,
    /// Fraction of the circumference that must be covered by edge
    /// pixels within one pixel of the radius.
    pub min_edge_support: f64,
}

impl MarkerDetectorConfig {
    /// Default median kernel.
    pub const DEFAULT_MEDIAN_KERNEL: u32 = 5;
    /// Default accumulator scale.
    pub const DEFAULT_DP: f64 = 1.2;
    /// Default center separation.
    pub const DEFAULT_MIN_DIST: f64 = 200.0;
    /// Default high Canny threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 40.0;
    /// Default vote threshold.
    pub const DEFAULT_ACCUMULATOR_THRESHOLD: u32 = 16;
    /// Default minimum radius.
    pub const DEFAULT_MIN_RADIUS: u32 = 6;
    /// Default maximum radius.
    pub const DEFAULT_MAX_RADIUS: u32 = 10;
    /// Default ring coverage.
    pub const DEFAULT_MIN_EDGE_SUPPORT: f64 = 0.6;
    /// Largest `max_radius` accepted by validation (pixels). Screw heads
    /// are a few pixels across; the detector's radius histogram is sized
    /// by this range.
    pub const MAX_RADIUS_LIMIT: u32 = 256;
}

impl Default for MarkerDetectorConfig {
    fn default() -> Self {
        Self {
            median_kernel: Self::DEFAULT_MEDIAN_KERNEL,
            dp: Self::DEFAULT_DP,
            min_dist: Self::DEFAULT_MIN_DIST,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            accumulator_threshold: Self::DEFAULT_ACCUMULATOR_THRESHOLD,
            min_radius: Self::DEFAULT_MIN_RADIUS,
            max_radius: Self::DEFAULT_MAX_RADIUS,
            min_edge_support: Self::DEFAULT_MIN_EDGE_SUPPORT,
        }
    }
}

/// Parameters of the workpiece outline detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Gaussian blur sigma applied before edge detection.
    pub blur_sigma: f32,
    /// Canny low threshold.
    pub canny_low: f32,
    /// Canny high threshold.
    pub canny_high: f32,
    /// Polygon approximation tolerance as a fraction of the contour
    /// perimeter.
    pub epsilon_fraction: f64,
}

impl ContourConfig {
    /// Default blur sigma (equivalent to a 5x5 kernel).
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.1;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = 50.0;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 150.0;
    /// Default approximation tolerance (2% of the perimeter).
    pub const DEFAULT_EPSILON_FRACTION: f64 = 0.02;
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            epsilon_fraction: Self::DEFAULT_EPSILON_FRACTION,
        }
    }
}

/// Parameters of the 4-corner extrusion traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Percentage of each edge traversed while extruding, in (0, 100).
    pub extrusion_split_percent: f64,
    /// Extrusion delta for even-indexed legs.
    pub extrusion_even: f64,
    /// Extrusion delta for odd-indexed legs.
    pub extrusion_odd: f64,
    /// Feed rate of the extruding sub-leg (mm/min).
    pub extrude_feed_rate: f64,
    /// Feed rate of the non-extruding sub-leg (mm/min).
    pub travel_feed_rate: f64,
    /// Nozzle height while drawing (mm).
    pub draw_z: f64,
    /// Nozzle height for the rapid approach to the first corner (mm).
    pub approach_z: f64,
    /// Feed rate of the rapid approach (mm/min).
    pub approach_feed_rate: f64,
    /// Where the head waits while the operator places the workpiece,
    /// and returns to after tracing.
    pub park: ToolPosition,
    /// Also trace the closing edge from the last corner back to the
    /// first.
    pub close_loop: bool,
}

impl MotionConfig {
    /// Park position clear of the camera's view.
    pub const DEFAULT_PARK: ToolPosition = ToolPosition {
        x: 250.0,
        y: 250.0,
        z: 50.0,
        feed_rate: 10_000.0,
    };
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            extrusion_split_percent: 50.0,
            extrusion_even: 4.0,
            extrusion_odd: 2.0,
            extrude_feed_rate: 400.0,
            travel_feed_rate: 200.0,
            draw_z: 6.0,
            approach_z: 10.0,
            approach_feed_rate: 3000.0,
            park: Self::DEFAULT_PARK,
            close_loop: false,
        }
    }
}

/// Configuration for one capture-to-path run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Marker detection parameters.
    pub markers: MarkerDetectorConfig,
    /// Real marker positions.
    pub layout: MarkerLayout,
    /// Workpiece outline parameters.
    pub contour: ContourConfig,
    /// Inward offset applied to each corner (mm).
    pub interior_offset_mm: f64,
    /// Traversal parameters.
    pub motion: MotionConfig,
}

impl TraceConfig {
    /// Default inward corner offset.
    pub const DEFAULT_INTERIOR_OFFSET_MM: f64 = 5.0;

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// out-of-range parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let m = &self.markers;
        if m.median_kernel == 0 || m.median_kernel % 2 == 0 {
            return Err(invalid(format!(
                "markers.median_kernel must be odd, got {}",
                m.median_kernel
            )));
        }
        if !(m.dp.is_finite() && m.dp >= 1.0) {
            return Err(invalid(format!("markers.dp must be >= 1.0, got {}", m.dp)));
        }
        if m.min_radius == 0 || m.min_radius > m.max_radius {
            return Err(invalid(format!(
                "markers radius range {}..={} is empty",
                m.min_radius, m.max_radius
            )));
        }
        if m.max_radius > MarkerDetectorConfig::MAX_RADIUS_LIMIT {
            return Err(invalid(format!(
                "markers.max_radius must be at most {}, got {}",
                MarkerDetectorConfig::MAX_RADIUS_LIMIT,
                m.max_radius
            )));
        }
        if !(m.min_dist.is_finite() && m.min_dist >= 0.0) {
            return Err(invalid(format!(
                "markers.min_dist must be non-negative, got {}",
                m.min_dist
            )));
        }
        if !(m.min_edge_support > 0.0 && m.min_edge_support <= 1.0) {
            return Err(invalid(format!(
                "markers.min_edge_support must be in (0, 1], got {}",
                m.min_edge_support
            )));
        }
        if m.canny_high <= 0.0 {
            return Err(invalid("markers.canny_high must be positive".into()));
        }
        let c = &self.contour;
        if c.canny_low > c.canny_high {
            return Err(invalid(format!(
                "contour.canny_low ({}) exceeds canny_high ({})",
                c.canny_low, c.canny_high
            )));
        }
        if !(c.epsilon_fraction > 0.0 && c.epsilon_fraction < 1.0) {
            return Err(invalid(format!(
                "contour.epsilon_fraction must be in (0, 1), got {}",
                c.epsilon_fraction
            )));
        }
        if !(self.interior_offset_mm.is_finite() && self.interior_offset_mm >= 0.0) {
            return Err(invalid(format!(
                "interior_offset_mm must be non-negative, got {}",
                self.interior_offset_mm
            )));
        }
        let mo = &self.motion;
        if !(mo.extrusion_split_percent > 0.0 && mo.extrusion_split_percent < 100.0) {
            return Err(invalid(format!(
                "motion.extrusion_split_percent must be in (0, 100), got {}",
                mo.extrusion_split_percent
            )));
        }
        for (name, feed) in [
            ("extrude_feed_rate", mo.extrude_feed_rate),
            ("travel_feed_rate", mo.travel_feed_rate),
            ("approach_feed_rate", mo.approach_feed_rate),
            ("park.feed_rate", mo.park.feed_rate),
        ] {
            if !(feed.is_finite() && feed > 0.0) {
                return Err(invalid(format!("motion.{name} must be positive, got {feed}")));
            }
        }
        Ok(())
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            markers: MarkerDetectorConfig::default(),
            layout: MarkerLayout::default(),
            contour: ContourConfig::default(),
            interior_offset_mm: Self::DEFAULT_INTERIOR_OFFSET_MM,
            motion: MotionConfig::default(),
        }
    }
}

fn invalid(msg: String) -> PipelineError {
    PipelineError::InvalidConfig(msg)
}

/// How the caller should treat a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abandon the current capture cycle and let the operator retry.
    Recoverable,
    /// The camera-to-machine mapping is unusable; never send its output
    /// to the printer.
    Calibration,
    /// A parameter is out of range.
    Configuration,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Marker detection did not yield exactly four markers.
    #[error("expected 4 calibration markers, found {found}")]
    WrongMarkerCount {
        /// Number of markers detected.
        found: usize,
    },

    /// Edge detection produced no external contour.
    #[error("no contours found in the image")]
    NoContours,

    /// The workpiece outline did not simplify to a quadrilateral.
    #[error("expected 4 workpiece corners, found {found}")]
    WrongCornerCount {
        /// Number of polygon vertices after approximation.
        found: usize,
    },

    /// The marker correspondences do not define a usable transform.
    #[error("degenerate calibration: {0}")]
    DegenerateCalibration(String),

    /// A point maps to (or near) the line at infinity.
    #[error("degenerate mapping for image point ({x:.2}, {y:.2}): homogeneous component {w:e}")]
    DegenerateMapping {
        /// Image x of the offending point.
        x: f64,
        /// Image y of the offending point.
        y: f64,
        /// Homogeneous component of the mapped point.
        w: f64,
    },
}

impl PipelineError {
    /// Classify this error for the caller.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::ImageDecode(_)
            | Self::EmptyInput
            | Self::WrongMarkerCount { .. }
            | Self::NoContours
            | Self::WrongCornerCount { .. } => Severity::Recoverable,
            Self::DegenerateCalibration(_) | Self::DegenerateMapping { .. } => {
                Severity::Calibration
            }
            Self::InvalidConfig(_) => Severity::Configuration,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TraceConfig::default().validate().is_ok());
    }

    #[test]
    fn even_median_kernel_rejected() {
        let mut config = TraceConfig::default();
        config.markers.median_kernel = 4;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_radius_range_rejected() {
        let mut config = TraceConfig::default();
        config.markers.min_radius = 12;
        config.markers.max_radius = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_radius_range_rejected() {
        let config: TraceConfig =
            serde_json::from_str(r#"{"markers": {"max_radius": 4294967295}}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("max_radius")
        ));

        let mut config = TraceConfig::default();
        config.markers.max_radius = MarkerDetectorConfig::MAX_RADIUS_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn split_percent_out_of_range_rejected() {
        let mut config = TraceConfig::default();
        config.motion.extrusion_split_percent = 0.0;
        assert!(config.validate().is_err());
        config.motion.extrusion_split_percent = 120.0;
        assert!(config.validate().is_err());
        // A full split would leave an edge without its travel sub-leg.
        config.motion.extrusion_split_percent = 100.0;
        assert!(config.validate().is_err());
        config.motion.extrusion_split_percent = 99.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_offset_rejected() {
        let config = TraceConfig {
            interior_offset_mm: -1.0,
            ..TraceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: TraceConfig =
            serde_json::from_str(r#"{"interior_offset_mm": 3.0, "motion": {"close_loop": true}}"#)
                .unwrap();
        assert!((config.interior_offset_mm - 3.0).abs() < f64::EPSILON);
        assert!(config.motion.close_loop);
        assert_eq!(config.markers, MarkerDetectorConfig::default());
        assert_eq!(config.layout, MarkerLayout::DEFAULT);
    }

    #[test]
    fn json_round_trip() {
        let config = TraceConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TraceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn severity_classification() {
        assert_eq!(
            PipelineError::WrongMarkerCount { found: 2 }.severity(),
            Severity::Recoverable
        );
        assert_eq!(
            PipelineError::DegenerateCalibration("collinear".into()).severity(),
            Severity::Calibration
        );
        assert_eq!(
            PipelineError::InvalidConfig("x".into()).severity(),
            Severity::Configuration
        );
    }

    #[test]
    fn lerp_midpoint() {
        let a = MachinePoint::new(0.0, 10.0);
        let b = MachinePoint::new(20.0, 30.0);
        assert_eq!(a.lerp(b, 0.5), MachinePoint::new(10.0, 20.0));
        assert_eq!(a.lerp(b, 0.0), a);
    }
}
