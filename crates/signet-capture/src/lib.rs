//! signet-capture: camera stream lifecycle and still-frame capture.
//!
//! Owns the hardware video stream exclusively: acquisition walks a descending
//! ladder of quality constraints, at most one stream handle is ever live, and
//! teardown is unconditional and idempotent. The V4L2 backend is the
//! production implementation of the [`StreamBackend`] port; tests run against
//! a scripted mock.

pub mod backend;
pub mod controller;
pub mod overlay;
pub mod v4l2;
pub mod worker;

pub use backend::{
    CameraErrorKind, CapturedFrame, ConstraintTier, FacingMode, StreamBackend, StreamConstraints,
    StreamError, VideoStream,
};
pub use controller::{CameraController, CameraState, CancelFlag};
pub use v4l2::V4lBackend;
pub use worker::{spawn_capture_worker, CaptureHandle, CaptureStatus};
