//! Stream backend port: constraint tiers, error taxonomy, and the traits a
//! camera implementation must provide.

use signet_core::Raster;
use thiserror::Error;

/// Which physical camera the subject is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    Front,
    Back,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Front => FacingMode::Back,
            FacingMode::Back => FacingMode::Front,
        }
    }
}

/// Descending-quality acquisition ladder. First tier to succeed wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintTier {
    /// Ideal 1920×1080, floor 1280×720, 30 fps.
    High,
    /// Ideal 1280×720.
    Medium,
    /// Whatever the device offers.
    Basic,
}

impl ConstraintTier {
    pub const DESCENDING: [ConstraintTier; 3] =
        [ConstraintTier::High, ConstraintTier::Medium, ConstraintTier::Basic];

    pub fn constraints(self) -> StreamConstraints {
        match self {
            ConstraintTier::High => StreamConstraints {
                ideal_width: Some(1920),
                ideal_height: Some(1080),
                min_width: Some(1280),
                min_height: Some(720),
                frame_rate: Some(30),
            },
            ConstraintTier::Medium => StreamConstraints {
                ideal_width: Some(1280),
                ideal_height: Some(720),
                min_width: None,
                min_height: None,
                frame_rate: None,
            },
            ConstraintTier::Basic => StreamConstraints {
                ideal_width: None,
                ideal_height: None,
                min_width: None,
                min_height: None,
                frame_rate: None,
            },
        }
    }
}

/// Resolution/rate request handed to the backend for one tier attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub frame_rate: Option<u32>,
}

/// Classified camera failure, surfaced to the UI as state, never thrown
/// past the controller boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraErrorKind {
    PermissionDenied,
    DeviceNotFound,
    Unsupported,
    DeviceBusy,
    SinkUnavailable,
    Unknown,
}

impl CameraErrorKind {
    /// Short, actionable message per kind. The subject is signing a legal
    /// document; raw driver errors never reach them.
    pub fn user_message(self) -> &'static str {
        match self {
            CameraErrorKind::PermissionDenied => {
                "Camera access was denied. Allow camera access and try again."
            }
            CameraErrorKind::DeviceNotFound => "No camera was found on this device.",
            CameraErrorKind::Unsupported => "This device's camera is not supported.",
            CameraErrorKind::DeviceBusy => {
                "The camera is in use by another application. Close it and try again."
            }
            CameraErrorKind::SinkUnavailable => "The video preview could not be attached.",
            CameraErrorKind::Unknown => "The camera could not be started.",
        }
    }
}

#[derive(Error, Debug)]
#[error("camera stream error ({kind:?}): {message}")]
pub struct StreamError {
    pub kind: CameraErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: CameraErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One captured still with its acquisition sequence number. The sequence
/// identifies which frame a downstream aligned crop was taken from.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub raster: Raster,
    pub sequence: u64,
}

/// A live hardware stream. Exactly one may exist at a time; the controller
/// enforces that by stopping the previous handle before requesting another.
pub trait VideoStream {
    /// Block until the first frame is flowing. Acquisition is not `Ready`
    /// until this returns.
    fn wait_first_frame(&mut self) -> Result<(), StreamError>;

    /// Grab the current frame at native resolution.
    fn grab_frame(&mut self) -> Result<CapturedFrame, StreamError>;

    /// Native (width, height) of the negotiated stream.
    fn dimensions(&self) -> (u32, u32);

    /// Release the hardware handle. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Camera acquisition capability.
pub trait StreamBackend {
    type Stream: VideoStream;

    fn request_stream(
        &mut self,
        tier: ConstraintTier,
        facing: FacingMode,
    ) -> Result<Self::Stream, StreamError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted backend for hardware-free controller and worker tests.

    use super::*;
    use crate::controller::CancelFlag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Copy)]
    pub enum TierOutcome {
        Stream(u32, u32),
        Fail(CameraErrorKind),
    }

    pub struct MockBackend {
        script: Vec<(ConstraintTier, TierOutcome)>,
        live: Arc<AtomicUsize>,
        max_live: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
        /// When set, the next `wait_first_frame` trips this flag;
        /// simulates teardown racing a pending acquisition.
        pub cancel_during_wait: Option<CancelFlag>,
    }

    impl MockBackend {
        pub fn new(script: Vec<(ConstraintTier, TierOutcome)>) -> Self {
            Self {
                script,
                live: Arc::new(AtomicUsize::new(0)),
                max_live: Arc::new(AtomicUsize::new(0)),
                attempts: Arc::new(AtomicUsize::new(0)),
                cancel_during_wait: None,
            }
        }

        /// Count of currently live stream handles.
        pub fn live_handles(&self) -> Arc<AtomicUsize> {
            self.live.clone()
        }

        /// High-water mark of simultaneously live handles.
        pub fn max_live_handles(&self) -> Arc<AtomicUsize> {
            self.max_live.clone()
        }

        /// Total `request_stream` calls observed.
        pub fn attempts(&self) -> Arc<AtomicUsize> {
            self.attempts.clone()
        }
    }

    impl StreamBackend for MockBackend {
        type Stream = MockStream;

        fn request_stream(
            &mut self,
            tier: ConstraintTier,
            _facing: FacingMode,
        ) -> Result<MockStream, StreamError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .script
                .iter()
                .find(|(t, _)| *t == tier)
                .map(|(_, o)| *o)
                .unwrap_or(TierOutcome::Fail(CameraErrorKind::Unknown));

            match outcome {
                TierOutcome::Stream(w, h) => {
                    let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_live.fetch_max(now, Ordering::SeqCst);
                    Ok(MockStream {
                        width: w,
                        height: h,
                        live: self.live.clone(),
                        stopped: false,
                        sequence: 0,
                        cancel_on_wait: self.cancel_during_wait.clone(),
                    })
                }
                TierOutcome::Fail(kind) => Err(StreamError::new(kind, "scripted failure")),
            }
        }
    }

    pub struct MockStream {
        width: u32,
        height: u32,
        live: Arc<AtomicUsize>,
        stopped: bool,
        sequence: u64,
        cancel_on_wait: Option<CancelFlag>,
    }

    impl VideoStream for MockStream {
        fn wait_first_frame(&mut self) -> Result<(), StreamError> {
            if let Some(flag) = &self.cancel_on_wait {
                flag.cancel();
            }
            Ok(())
        }

        fn grab_frame(&mut self) -> Result<CapturedFrame, StreamError> {
            let mut raster = Raster::new(self.width, self.height);
            // Marker pixel so tests can observe mirroring.
            raster.put_pixel(0, 0, [255, 0, 0]);
            self.sequence += 1;
            Ok(CapturedFrame {
                raster,
                sequence: self.sequence,
            })
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
