//! plotbed-pipeline: pixel-to-machine coordinate pipeline (sans-IO).
//!
//! Turns a webcam snapshot of the print bed into a motion plan through:
//! marker detection -> marker ordering -> perspective calibration ->
//! outline detection -> coordinate mapping -> interior offset ->
//! motion planning.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! byte slices and returns structured data. Talking to the printer,
//! the camera and the filesystem lives in `plotbed-io`.

pub mod annotate;
pub mod blur;
pub mod calibrate;
pub mod contour;
pub mod edge;
pub mod grayscale;
pub mod marker;
pub mod motion;
pub mod offset;
pub mod order;
pub mod pattern;
pub mod pipeline;
pub mod simplify;
pub mod types;

use serde::{Deserialize, Serialize};

pub use calibrate::PerspectiveTransform;
pub use contour::CornerPolygon;
pub use marker::Circle;
pub use motion::{MotionPlan, MotionSegment, Move};
pub use offset::AdjustedCorners;
pub use order::OrderedMarkers;
pub use pattern::{PatternConfig, PatternPlan};
pub use pipeline::Pipeline;
pub use types::{
    Dimensions, MachinePoint, MarkerLayout, PipelineError, Point, RgbaImage, Severity,
    ToolPosition, TraceConfig,
};

/// Every intermediate of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceResult {
    /// Source image size.
    pub dimensions: Dimensions,
    /// The four detected marker circles.
    pub circles: Vec<Circle>,
    /// Marker centers in canonical order.
    pub ordered_markers: OrderedMarkers,
    /// Pixel-to-millimetre transform.
    pub transform: PerspectiveTransform,
    /// Approximated workpiece outline (pixels).
    pub polygon: CornerPolygon,
    /// Outline vertices in machine space, in role order.
    pub mapped_corners: [MachinePoint; 4],
    /// Corners after the inward offset.
    pub adjusted_corners: AdjustedCorners,
    /// The traversal.
    pub plan: MotionPlan,
}

/// A [`TraceResult`] together with the diagnostic overlays.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Pipeline output.
    pub result: TraceResult,
    /// Source image with the detected markers.
    pub markers_image: RgbaImage,
    /// Source image with the outline vertices.
    pub corners_image: RgbaImage,
}

/// Run the full pipeline on encoded image bytes.
///
/// # Pipeline steps
///
/// 1. Validate the configuration, decode the image
/// 2. Detect circular markers
/// 3. Order exactly four markers and solve the perspective transform
/// 4. Detect and approximate the workpiece outline
/// 5. Map exactly four outline vertices to machine space, assign roles
/// 6. Offset corners inward and plan the traversal
///
/// # Errors
///
/// Any stage error aborts the run; see [`PipelineError`] and
/// [`PipelineError::severity`].
pub fn process(image_bytes: &[u8], config: &TraceConfig) -> Result<TraceResult, PipelineError> {
    Ok(Pipeline::new(image_bytes.to_vec(), config.clone())
        .decode()?
        .detect_markers()
        .calibrate()?
        .detect_outline()?
        .map_corners()?
        .plan()?
        .into_result())
}

/// Run the full pipeline and also return the annotated images.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged(
    image_bytes: &[u8],
    config: &TraceConfig,
) -> Result<StagedResult, PipelineError> {
    let markers = Pipeline::new(image_bytes.to_vec(), config.clone())
        .decode()?
        .detect_markers();
    let markers_image = markers.annotated();
    let outline = markers.calibrate()?.detect_outline()?;
    let corners_image = outline.annotated();
    let result = outline.map_corners()?.plan()?.into_result();
    Ok(StagedResult {
        result,
        markers_image,
        corners_image,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_circle_mut;

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    fn test_config() -> TraceConfig {
        TraceConfig::default()
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &test_config());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_rejects_unbounded_radius_before_decoding() {
        let config: TraceConfig =
            serde_json::from_str(r#"{"markers": {"min_dist": 100, "max_radius": 4294967295}}"#)
                .unwrap();
        let result = process(&[0xFF, 0x00], &config);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &test_config());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn invalid_config_rejected_before_decoding() {
        let mut config = test_config();
        config.markers.median_kernel = 2;
        let result = process(&[], &config);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn two_markers_abort_before_calibration() {
        let mut img = RgbaImage::from_pixel(400, 300, image::Rgba([200, 200, 200, 255]));
        for c in [(100, 50), (300, 250)] {
            draw_filled_circle_mut(&mut img, c, 8, image::Rgba([30, 30, 30, 255]));
        }
        let markers = Pipeline::new(encode_png(&img), test_config())
            .decode()
            .unwrap()
            .detect_markers();
        assert_eq!(markers.circles().len(), 2);
        let result = markers.calibrate();
        assert!(matches!(
            result,
            Err(PipelineError::WrongMarkerCount { found: 2 })
        ));
    }

    #[test]
    fn blank_bed_reports_no_markers() {
        let img = RgbaImage::from_pixel(200, 200, image::Rgba([200, 200, 200, 255]));
        let result = process(&encode_png(&img), &test_config());
        let err = result.unwrap_err();
        assert!(matches!(err, PipelineError::WrongMarkerCount { found: 0 }));
        assert_eq!(err.severity(), Severity::Recoverable);
    }
}
