//! Canonical ordering of the four calibration markers.
//!
//! The camera looks down at the bed with the jig roughly axis-aligned in
//! the image, so rows are found by sorting on `y` and columns within a
//! row by sorting on `x`. Strong perspective skew or a jig rotated by
//! close to 45 degrees breaks this assumption.

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, Point};

/// Four marker centers in the order top-left, top-right, bottom-left,
/// bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderedMarkers(pub [Point; 4]);

impl OrderedMarkers {
    /// The points in canonical order.
    #[must_use]
    pub const fn points(&self) -> &[Point; 4] {
        &self.0
    }
}

/// Arrange exactly four marker centers into canonical order.
///
/// Stable sort by `y`, split into a top and a bottom pair, then stable
/// sort each pair by `x`.
///
/// # Errors
///
/// Returns [`PipelineError::WrongMarkerCount`] unless `markers` holds
/// exactly four points.
pub fn order_markers(markers: &[Point]) -> Result<OrderedMarkers, PipelineError> {
    let mut sorted: [Point; 4] = markers
        .try_into()
        .map_err(|_| PipelineError::WrongMarkerCount {
            found: markers.len(),
        })?;

    sorted.sort_by(|a, b| a.y.total_cmp(&b.y));
    let (top, bottom) = sorted.split_at_mut(2);
    top.sort_by(|a, b| a.x.total_cmp(&b.x));
    bottom.sort_by(|a, b| a.x.total_cmp(&b.x));

    Ok(OrderedMarkers(sorted))
}
