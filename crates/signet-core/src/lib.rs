//! signet-core: face landmark model and geometric alignment engine.
//!
//! Pure numerical code: similarity-transform estimation, affine warping
//! into a canonical face layout, and the value types shared by the capture
//! and session crates. The neural face detector is an external collaborator
//! reached through the [`FaceDetector`] port.

pub mod detector;
pub mod geometry;
pub mod landmarks;
pub mod raster;

pub use detector::{DetectionResult, DetectorError, FaceDetector, FaceRect};
pub use geometry::{AlignedFace, AlignmentError, OutputSize, SimilarityTransform};
pub use landmarks::FaceLandmarkSet;
pub use raster::Raster;
