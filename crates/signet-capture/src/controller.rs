//! Camera lifecycle controller.
//!
//! Drives acquisition down the constraint ladder, holds the single live
//! stream handle, and turns every hardware failure into classified state.
//! Retry policy belongs to the caller; the controller never retries on its
//! own.

use crate::backend::{
    CameraErrorKind, CapturedFrame, ConstraintTier, FacingMode, StreamBackend, VideoStream,
};
use crate::overlay;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token owned by the controller, checked after every
/// suspension point. A clone handed to the teardown path lets an unmount
/// abort a mid-flight acquisition instead of adopting its stream.
///
/// Cancellation is terminal: the flag is never cleared, so every later
/// `start_camera` on the same controller is a no-op. A torn-down capture
/// surface gets a fresh controller, not a restart.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Initializing,
    Ready,
    Error,
}

pub struct CameraController<B: StreamBackend> {
    backend: B,
    facing: FacingMode,
    state: CameraState,
    stream: Option<B::Stream>,
    last_error: Option<CameraErrorKind>,
    /// `None` until the platform has answered a permission prompt.
    has_permission: Option<bool>,
    tier_used: Option<ConstraintTier>,
    cancel: CancelFlag,
}

impl<B: StreamBackend> CameraController<B> {
    pub fn new(backend: B, facing: FacingMode) -> Self {
        Self::with_cancel(backend, facing, CancelFlag::new())
    }

    /// Construct with an externally shared cancel flag (worker teardown).
    pub fn with_cancel(backend: B, facing: FacingMode, cancel: CancelFlag) -> Self {
        Self {
            backend,
            facing,
            state: CameraState::Idle,
            stream: None,
            last_error: None,
            has_permission: None,
            tier_used: None,
            cancel,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CameraState::Ready
    }

    pub fn is_initializing(&self) -> bool {
        self.state == CameraState::Initializing
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn last_error(&self) -> Option<CameraErrorKind> {
        self.last_error
    }

    pub fn has_permission(&self) -> Option<bool> {
        self.has_permission
    }

    /// Which ladder tier produced the live stream, while `Ready`.
    pub fn tier_used(&self) -> Option<ConstraintTier> {
        self.tier_used
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Acquire a stream, walking the constraint ladder top down.
    ///
    /// Any existing stream is stopped first: two concurrent hardware
    /// handles never exist. A call while already `Initializing` is a no-op
    /// so racing acquisitions cannot interleave.
    pub fn start_camera(&mut self) {
        if self.state == CameraState::Initializing {
            tracing::debug!("start_camera ignored: acquisition already in progress");
            return;
        }

        self.stop_camera();
        self.state = CameraState::Initializing;
        self.last_error = None;
        self.tier_used = None;

        let mut last_kind = CameraErrorKind::Unknown;

        for tier in ConstraintTier::DESCENDING {
            if self.cancel.is_cancelled() {
                tracing::debug!("acquisition cancelled before tier attempt");
                self.state = CameraState::Idle;
                return;
            }

            match self.backend.request_stream(tier, self.facing) {
                Ok(mut stream) => {
                    if self.cancel.is_cancelled() {
                        // Never adopt a stream acquired after cancellation.
                        stream.stop();
                        self.state = CameraState::Idle;
                        return;
                    }

                    match stream.wait_first_frame() {
                        Ok(()) => {
                            if self.cancel.is_cancelled() {
                                stream.stop();
                                self.state = CameraState::Idle;
                                return;
                            }
                            let (w, h) = stream.dimensions();
                            tracing::info!(?tier, width = w, height = h, "camera ready");
                            self.has_permission = Some(true);
                            self.tier_used = Some(tier);
                            self.stream = Some(stream);
                            self.state = CameraState::Ready;
                            return;
                        }
                        Err(e) => {
                            stream.stop();
                            tracing::warn!(?tier, error = %e, "first frame never arrived");
                            last_kind = e.kind;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(?tier, error = %e, "stream request failed");
                    last_kind = e.kind;
                }
            }

            if last_kind == CameraErrorKind::PermissionDenied {
                // Lower tiers would re-prompt for the same denied permission.
                self.has_permission = Some(false);
                break;
            }
        }

        self.state = CameraState::Error;
        self.last_error = Some(last_kind);
        tracing::warn!(kind = ?last_kind, "camera acquisition failed on every tier");
    }

    /// Release the stream and detach it from the output sink. Safe to call
    /// at any time, including when already stopped.
    pub fn stop_camera(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!("camera stream stopped");
        }
        self.tier_used = None;
        self.state = CameraState::Idle;
    }

    /// Toggle front/back and re-acquire with the new facing.
    pub fn switch_camera(&mut self) {
        self.facing = self.facing.toggled();
        tracing::info!(facing = ?self.facing, "switching camera");
        self.start_camera();
    }

    /// Render the current frame to an owned still at native resolution,
    /// keeping the frame's capture sequence number for provenance.
    ///
    /// Front-facing captures are mirrored so the stored image matches the
    /// preview the subject saw. A UTC timestamp is burned into the
    /// bottom-right corner for the audit trail.
    pub fn capture_image(&mut self) -> Option<CapturedFrame> {
        if self.state != CameraState::Ready {
            return None;
        }
        let stream = self.stream.as_mut()?;
        let (w, h) = stream.dimensions();
        if w == 0 || h == 0 {
            tracing::warn!("capture skipped: stream reports zero dimensions");
            return None;
        }

        let frame = match stream.grab_frame() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "frame grab failed");
                return None;
            }
        };

        let mut raster = if self.facing == FacingMode::Front {
            frame.raster.mirrored_horizontal()
        } else {
            frame.raster
        };

        let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        overlay::burn_timestamp(&mut raster, &stamp);
        Some(CapturedFrame {
            raster,
            sequence: frame.sequence,
        })
    }
}

impl<B: StreamBackend> Drop for CameraController<B> {
    fn drop(&mut self) {
        self.stop_camera();
    }
}
