//! Capture worker thread.
//!
//! The camera is a blocking resource; async callers reach it through a
//! request channel to a dedicated OS thread owning the controller. Closing
//! the channel (dropping the handle) tears the camera down unconditionally.

use crate::backend::{CameraErrorKind, CapturedFrame, ConstraintTier, FacingMode, StreamBackend};
use crate::controller::{CameraController, CameraState, CancelFlag};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("capture worker exited")]
    ChannelClosed,
}

/// Snapshot of the controller state, safe to hand to a UI layer.
#[derive(Debug, Clone, Copy)]
pub struct CaptureStatus {
    pub state: CameraState,
    pub facing: FacingMode,
    pub tier_used: Option<ConstraintTier>,
    pub last_error: Option<CameraErrorKind>,
    pub has_permission: Option<bool>,
}

enum WorkerRequest {
    Start { reply: oneshot::Sender<CaptureStatus> },
    Stop { reply: oneshot::Sender<CaptureStatus> },
    Switch { reply: oneshot::Sender<CaptureStatus> },
    Capture { reply: oneshot::Sender<Option<CapturedFrame>> },
    Status { reply: oneshot::Sender<CaptureStatus> },
}

/// Clone-safe async handle to the capture thread.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<WorkerRequest>,
    cancel: CancelFlag,
}

impl CaptureHandle {
    pub async fn start_camera(&self) -> Result<CaptureStatus, WorkerError> {
        self.request(|reply| WorkerRequest::Start { reply }).await
    }

    pub async fn stop_camera(&self) -> Result<CaptureStatus, WorkerError> {
        self.request(|reply| WorkerRequest::Stop { reply }).await
    }

    pub async fn switch_camera(&self) -> Result<CaptureStatus, WorkerError> {
        self.request(|reply| WorkerRequest::Switch { reply }).await
    }

    pub async fn capture_image(&self) -> Result<Option<CapturedFrame>, WorkerError> {
        self.request(|reply| WorkerRequest::Capture { reply }).await
    }

    pub async fn status(&self) -> Result<CaptureStatus, WorkerError> {
        self.request(|reply| WorkerRequest::Status { reply }).await
    }

    /// Abort a mid-flight acquisition. The worker discards any stream that
    /// lands after this is set.
    ///
    /// Cancellation models teardown and is terminal for this worker: later
    /// `start_camera` calls through any clone of the handle stay no-ops.
    /// Spawn a fresh worker to capture again.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WorkerRequest,
    ) -> Result<T, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)
    }
}

fn snapshot<B: StreamBackend>(ctl: &CameraController<B>) -> CaptureStatus {
    CaptureStatus {
        state: ctl.state(),
        facing: ctl.facing(),
        tier_used: ctl.tier_used(),
        last_error: ctl.last_error(),
        has_permission: ctl.has_permission(),
    }
}

/// Spawn the capture worker on a dedicated OS thread.
///
/// The controller is created inside the thread so the stream handle never
/// crosses a thread boundary. When the last handle is dropped the request
/// loop ends and `stop_camera` runs unconditionally before the thread exits.
pub fn spawn_capture_worker<B>(backend: B, facing: FacingMode) -> CaptureHandle
where
    B: StreamBackend + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<WorkerRequest>(4);
    let cancel = CancelFlag::new();
    let worker_cancel = cancel.clone();

    std::thread::Builder::new()
        .name("signet-capture".into())
        .spawn(move || {
            let mut ctl = CameraController::with_cancel(backend, facing, worker_cancel);
            tracing::info!("capture worker started");

            while let Some(req) = rx.blocking_recv() {
                match req {
                    WorkerRequest::Start { reply } => {
                        ctl.start_camera();
                        let _ = reply.send(snapshot(&ctl));
                    }
                    WorkerRequest::Stop { reply } => {
                        ctl.stop_camera();
                        let _ = reply.send(snapshot(&ctl));
                    }
                    WorkerRequest::Switch { reply } => {
                        ctl.switch_camera();
                        let _ = reply.send(snapshot(&ctl));
                    }
                    WorkerRequest::Capture { reply } => {
                        let _ = reply.send(ctl.capture_image());
                    }
                    WorkerRequest::Status { reply } => {
                        let _ = reply.send(snapshot(&ctl));
                    }
                }
            }

            // Teardown is unconditional, even if the last request left the
            // camera running.
            ctl.stop_camera();
            tracing::info!("capture worker exiting");
        })
        .expect("failed to spawn capture worker thread");

    CaptureHandle { tx, cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, TierOutcome};

    fn all_ok() -> MockBackend {
        MockBackend::new(vec![
            (ConstraintTier::High, TierOutcome::Stream(640, 480)),
            (ConstraintTier::Medium, TierOutcome::Stream(640, 480)),
            (ConstraintTier::Basic, TierOutcome::Stream(320, 240)),
        ])
    }

    #[tokio::test]
    async fn test_start_and_capture_through_handle() {
        let handle = spawn_capture_worker(all_ok(), FacingMode::Front);
        let status = handle.start_camera().await.unwrap();
        assert_eq!(status.state, CameraState::Ready);
        assert_eq!(status.tier_used, Some(ConstraintTier::High));

        let image = handle.capture_image().await.unwrap();
        assert!(image.is_some());
    }

    #[tokio::test]
    async fn test_switch_through_handle() {
        let handle = spawn_capture_worker(all_ok(), FacingMode::Front);
        handle.start_camera().await.unwrap();
        let status = handle.switch_camera().await.unwrap();
        assert_eq!(status.facing, FacingMode::Back);
        assert_eq!(status.state, CameraState::Ready);
    }

    #[tokio::test]
    async fn test_drop_releases_stream() {
        let backend = all_ok();
        let live = backend.live_handles();
        let handle = spawn_capture_worker(backend, FacingMode::Front);
        handle.start_camera().await.unwrap();
        assert_eq!(live.load(std::sync::atomic::Ordering::SeqCst), 1);

        drop(handle);
        // The worker thread stops the camera on channel close.
        for _ in 0..50 {
            if live.load(std::sync::atomic::Ordering::SeqCst) == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("stream still live after handle drop");
    }

    #[tokio::test]
    async fn test_capture_reports_frame_sequence() {
        let handle = spawn_capture_worker(all_ok(), FacingMode::Front);
        handle.start_camera().await.unwrap();
        let first = handle.capture_image().await.unwrap().unwrap();
        let second = handle.capture_image().await.unwrap().unwrap();
        assert!(second.sequence > first.sequence);
    }

    #[tokio::test]
    async fn test_start_after_cancel_stays_idle() {
        // Cancel models teardown; the worker never acquires again.
        let backend = all_ok();
        let attempts = backend.attempts();
        let handle = spawn_capture_worker(backend, FacingMode::Front);

        handle.cancel();
        let status = handle.start_camera().await.unwrap();
        assert_eq!(status.state, CameraState::Idle);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 0);

        let again = handle.start_camera().await.unwrap();
        assert_eq!(again.state, CameraState::Idle);
        assert!(handle.capture_image().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_surfaced_in_status() {
        let backend = MockBackend::new(vec![
            (ConstraintTier::High, TierOutcome::Fail(CameraErrorKind::PermissionDenied)),
        ]);
        let handle = spawn_capture_worker(backend, FacingMode::Front);
        let status = handle.start_camera().await.unwrap();
        assert_eq!(status.state, CameraState::Error);
        assert_eq!(status.last_error, Some(CameraErrorKind::PermissionDenied));
        assert_eq!(status.has_permission, Some(false));
    }
}
