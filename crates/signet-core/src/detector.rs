//! Port for the external face-landmark detector.
//!
//! The network itself lives outside this workspace; the alignment engine
//! only consumes bounding boxes and point arrays through this trait.

use crate::raster::Raster;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// Axis-aligned face bounding box in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One detected face: box, full 68-point contour, and detector confidence.
///
/// Always a tagged value, `Option<DetectionResult>` at the call site, never
/// an implicitly-truthy blob.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub bounding_box: FaceRect,
    pub landmarks68: Vec<(f64, f64)>,
    pub confidence: f64,
}

/// External face detector capability.
///
/// Implementations return at most one face per image; detections below
/// `min_confidence` are reported as `None`.
pub trait FaceDetector {
    fn detect(
        &mut self,
        image: &Raster,
        min_confidence: f64,
    ) -> Result<Option<DetectionResult>, DetectorError>;
}
