//! Incremental pipeline: advance stage by stage, inspecting or persisting
//! each intermediate before continuing.
//!
//! ```rust
//! # use plotbed_pipeline::{Pipeline, TraceConfig, PipelineError};
//! # fn run(jpeg: Vec<u8>) -> Result<(), PipelineError> {
//! let markers = Pipeline::new(jpeg, TraceConfig::default())
//!     .decode()?
//!     .detect_markers();
//! let markers_overlay = markers.annotated();
//! let result = markers
//!     .calibrate()?
//!     .detect_outline()?
//!     .map_corners()?
//!     .plan()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state (or a
//! `Result` for fallible stages), carrying the earlier intermediates.
//! A failed stage leaves nothing to continue from, so a capture with the
//! wrong number of markers can never reach the calibration solver.

use crate::annotate;
use crate::calibrate::{self, PerspectiveTransform};
use crate::contour::{self, CornerPolygon};
use crate::marker::{self, Circle};
use crate::motion::{self, MotionPlan};
use crate::offset::{self, AdjustedCorners};
use crate::order::{self, OrderedMarkers};
use crate::types::{Dimensions, MachinePoint, PipelineError, Point, RgbaImage, TraceConfig};
use crate::TraceResult;

/// Entry point of the staged pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Start a run over encoded image bytes.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(source: Vec<u8>, config: TraceConfig) -> Pending {
        Pending { config, source }
    }
}

/// Before any processing.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending {
    config: TraceConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Validate the configuration and decode the image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for out-of-range
    /// parameters, [`PipelineError::EmptyInput`] for empty input and
    /// [`PipelineError::ImageDecode`] for undecodable bytes.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        self.config.validate()?;
        let original = crate::grayscale::decode(&self.source)?;
        tracing::debug!(
            width = original.width(),
            height = original.height(),
            bytes = self.source.len(),
            "image decoded"
        );
        Ok(Decoded {
            config: self.config,
            original,
        })
    }
}

/// After decoding.
#[must_use = "pipeline stages are consumed by advancing; call .detect_markers() to continue"]
pub struct Decoded {
    config: TraceConfig,
    original: RgbaImage,
}

impl Decoded {
    /// The decoded image.
    #[must_use]
    pub const fn original(&self) -> &RgbaImage {
        &self.original
    }

    /// Run the circle detector.
    pub fn detect_markers(self) -> MarkersDetected {
        let circles = marker::detect_markers(&self.original, &self.config.markers);
        MarkersDetected {
            config: self.config,
            original: self.original,
            circles,
        }
    }
}

/// After circle detection; the count has not been checked yet.
#[must_use = "pipeline stages are consumed by advancing; call .calibrate() to continue"]
pub struct MarkersDetected {
    config: TraceConfig,
    original: RgbaImage,
    circles: Vec<Circle>,
}

impl MarkersDetected {
    /// Detected circles, strongest first.
    #[must_use]
    pub fn circles(&self) -> &[Circle] {
        &self.circles
    }

    /// The source image with detected circles drawn on it.
    #[must_use]
    pub fn annotated(&self) -> RgbaImage {
        annotate::annotate_markers(&self.original, &self.circles)
    }

    /// Order the markers and solve for the perspective transform.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WrongMarkerCount`] unless exactly four
    /// circles were found, or [`PipelineError::DegenerateCalibration`]
    /// if they do not define a usable transform.
    pub fn calibrate(self) -> Result<Calibrated, PipelineError> {
        let centers: Vec<Point> = self.circles.iter().map(|c| c.center).collect();
        let ordered = order::order_markers(&centers)?;
        let transform = calibrate::solve(&ordered, &self.config.layout)?;
        tracing::debug!(markers = ?ordered.points(), "calibrated");
        Ok(Calibrated {
            config: self.config,
            original: self.original,
            circles: self.circles,
            ordered,
            transform,
        })
    }
}

/// After calibration.
#[must_use = "pipeline stages are consumed by advancing; call .detect_outline() to continue"]
pub struct Calibrated {
    config: TraceConfig,
    original: RgbaImage,
    circles: Vec<Circle>,
    ordered: OrderedMarkers,
    transform: PerspectiveTransform,
}

impl Calibrated {
    /// The pixel-to-millimetre transform.
    #[must_use]
    pub const fn transform(&self) -> &PerspectiveTransform {
        &self.transform
    }

    /// Markers in canonical order.
    #[must_use]
    pub const fn ordered(&self) -> &OrderedMarkers {
        &self.ordered
    }

    /// Find the workpiece outline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoContours`] if no outline is found.
    pub fn detect_outline(self) -> Result<OutlineDetected, PipelineError> {
        let polygon = contour::detect_outline(&self.original, &self.config.contour)?;
        Ok(OutlineDetected {
            config: self.config,
            original: self.original,
            circles: self.circles,
            ordered: self.ordered,
            transform: self.transform,
            polygon,
        })
    }
}

/// After outline detection; the vertex count has not been checked yet.
#[must_use = "pipeline stages are consumed by advancing; call .map_corners() to continue"]
pub struct OutlineDetected {
    config: TraceConfig,
    original: RgbaImage,
    circles: Vec<Circle>,
    ordered: OrderedMarkers,
    transform: PerspectiveTransform,
    polygon: CornerPolygon,
}

impl OutlineDetected {
    /// The approximated outline.
    #[must_use]
    pub const fn polygon(&self) -> &CornerPolygon {
        &self.polygon
    }

    /// The source image with the outline vertices drawn on it.
    #[must_use]
    pub fn annotated(&self) -> RgbaImage {
        annotate::annotate_corners(&self.original, self.polygon.points())
    }

    /// Map the four outline vertices into machine space and assign
    /// their roles.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WrongCornerCount`] unless the outline
    /// has exactly four vertices, or [`PipelineError::DegenerateMapping`]
    /// if a vertex cannot be mapped.
    pub fn map_corners(self) -> Result<CornersMapped, PipelineError> {
        if self.polygon.len() != 4 {
            return Err(PipelineError::WrongCornerCount {
                found: self.polygon.len(),
            });
        }
        let mapped = self.transform.map_all(self.polygon.points())?;
        let corners = offset::order_corners(&mapped)?;
        tracing::debug!(?corners, "corners mapped");
        Ok(CornersMapped {
            config: self.config,
            original: self.original,
            circles: self.circles,
            ordered: self.ordered,
            transform: self.transform,
            polygon: self.polygon,
            corners,
        })
    }
}

/// After mapping the workpiece corners.
#[must_use = "pipeline stages are consumed by advancing; call .plan() to continue"]
pub struct CornersMapped {
    config: TraceConfig,
    original: RgbaImage,
    circles: Vec<Circle>,
    ordered: OrderedMarkers,
    transform: PerspectiveTransform,
    polygon: CornerPolygon,
    corners: [MachinePoint; 4],
}

impl CornersMapped {
    /// Corners in role order, before the inward offset.
    #[must_use]
    pub const fn corners(&self) -> &[MachinePoint; 4] {
        &self.corners
    }

    /// Apply the inward offset and plan the traversal.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError::WrongCornerCount`] from the offset
    /// step; with four mapped corners this does not occur.
    pub fn plan(self) -> Result<Planned, PipelineError> {
        let adjusted = offset::adjust_for_interior(&self.corners, self.config.interior_offset_mm)?;
        let plan = motion::plan_traversal(&adjusted, &self.config.motion);
        Ok(Planned {
            original: self.original,
            circles: self.circles,
            ordered: self.ordered,
            transform: self.transform,
            polygon: self.polygon,
            corners: self.corners,
            adjusted,
            plan,
        })
    }
}

/// Final stage.
pub struct Planned {
    original: RgbaImage,
    circles: Vec<Circle>,
    ordered: OrderedMarkers,
    transform: PerspectiveTransform,
    polygon: CornerPolygon,
    corners: [MachinePoint; 4],
    adjusted: AdjustedCorners,
    plan: MotionPlan,
}

impl Planned {
    /// The motion plan.
    #[must_use]
    pub const fn plan(&self) -> &MotionPlan {
        &self.plan
    }

    /// Collect every intermediate into a [`TraceResult`].
    #[must_use]
    pub fn into_result(self) -> TraceResult {
        TraceResult {
            dimensions: Dimensions {
                width: self.original.width(),
                height: self.original.height(),
            },
            circles: self.circles,
            ordered_markers: self.ordered,
            transform: self.transform,
            polygon: self.polygon,
            mapped_corners: self.corners,
            adjusted_corners: self.adjusted,
            plan: self.plan,
        }
    }
}
