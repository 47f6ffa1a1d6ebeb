//! V4L2 stream backend via the `v4l` crate.
//!
//! Maps the constraint ladder onto format negotiation: each tier requests
//! YUYV at its ideal resolution and the High tier additionally enforces its
//! resolution floor, so a camera that cannot reach 1280×720 falls through to
//! the next tier instead of silently degrading.

use crate::backend::{
    CameraErrorKind, CapturedFrame, ConstraintTier, FacingMode, StreamBackend, StreamError,
    VideoStream,
};
use signet_core::Raster;
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const EBUSY: i32 = 16;

/// Info about a discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Backend with one device path per facing mode.
pub struct V4lBackend {
    pub front_device: String,
    pub back_device: String,
}

impl V4lBackend {
    pub fn new(front_device: impl Into<String>, back_device: impl Into<String>) -> Self {
        Self {
            front_device: front_device.into(),
            back_device: back_device.into(),
        }
    }

    fn device_path(&self, facing: FacingMode) -> &str {
        match facing {
            FacingMode::Front => &self.front_device,
            FacingMode::Back => &self.back_device,
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl StreamBackend for V4lBackend {
    type Stream = V4lStream;

    fn request_stream(
        &mut self,
        tier: ConstraintTier,
        facing: FacingMode,
    ) -> Result<V4lStream, StreamError> {
        let path = self.device_path(facing).to_string();
        if !Path::new(&path).exists() {
            return Err(StreamError::new(
                CameraErrorKind::DeviceNotFound,
                format!("no such device: {path}"),
            ));
        }

        let device = Device::with_path(&path).map_err(|e| classify_open_error(&path, &e))?;

        let caps = device.query_caps().map_err(|e| {
            StreamError::new(
                CameraErrorKind::Unknown,
                format!("failed to query capabilities: {e}"),
            )
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(StreamError::new(
                CameraErrorKind::Unsupported,
                format!("{path} is not a capture device"),
            ));
        }

        let mut fmt = device.format().map_err(|e| {
            StreamError::new(CameraErrorKind::Unknown, format!("failed to get format: {e}"))
        })?;

        let constraints = tier.constraints();
        fmt.fourcc = FourCC::new(b"YUYV");
        if let (Some(w), Some(h)) = (constraints.ideal_width, constraints.ideal_height) {
            fmt.width = w;
            fmt.height = h;
        }

        let negotiated = device.set_format(&fmt).map_err(|e| {
            StreamError::new(CameraErrorKind::Unknown, format!("failed to set format: {e}"))
        })?;

        if negotiated.fourcc != FourCC::new(b"YUYV") {
            return Err(StreamError::new(
                CameraErrorKind::Unsupported,
                format!("device negotiated {:?}, need YUYV", negotiated.fourcc),
            ));
        }

        if let (Some(min_w), Some(min_h)) = (constraints.min_width, constraints.min_height) {
            if negotiated.width < min_w || negotiated.height < min_h {
                return Err(StreamError::new(
                    CameraErrorKind::Unsupported,
                    format!(
                        "negotiated {}x{} below tier floor {min_w}x{min_h}",
                        negotiated.width, negotiated.height
                    ),
                ));
            }
        }

        if let Some(fps) = constraints.frame_rate {
            // Best effort; plenty of drivers ignore the interval request.
            let _ = device.set_params(&v4l::video::capture::Parameters::with_fps(fps));
        }

        tracing::info!(
            device = %path,
            ?tier,
            width = negotiated.width,
            height = negotiated.height,
            "negotiated stream format"
        );

        Ok(V4lStream {
            device: Some(device),
            width: negotiated.width,
            height: negotiated.height,
            device_path: path,
        })
    }
}

/// A live V4L2 stream handle. Dropping (or stopping) releases the device fd.
pub struct V4lStream {
    device: Option<Device>,
    width: u32,
    height: u32,
    device_path: String,
}

impl V4lStream {
    /// Dequeue one raw YUYV buffer with its driver sequence number. An mmap
    /// stream is created per grab so the handle itself stays borrow-free
    /// between captures.
    fn read_raw(&mut self) -> Result<(Vec<u8>, u64), StreamError> {
        let device = self.device.as_ref().ok_or_else(|| {
            StreamError::new(CameraErrorKind::SinkUnavailable, "stream already stopped")
        })?;

        let mut stream =
            MmapStream::with_buffers(device, BufType::VideoCapture, 4).map_err(|e| {
                StreamError::new(
                    CameraErrorKind::Unknown,
                    format!("failed to create mmap stream: {e}"),
                )
            })?;

        let (buf, meta) = stream.next().map_err(|e| {
            StreamError::new(
                CameraErrorKind::Unknown,
                format!("failed to dequeue buffer: {e}"),
            )
        })?;

        Ok((buf.to_vec(), meta.sequence as u64))
    }
}

impl VideoStream for V4lStream {
    fn wait_first_frame(&mut self) -> Result<(), StreamError> {
        // A successful dequeue is the frame-flowing signal; the frame itself
        // is discarded while AGC/AE settles.
        self.read_raw()?;
        tracing::debug!(device = %self.device_path, "first frame flowing");
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<CapturedFrame, StreamError> {
        let (raw, sequence) = self.read_raw()?;
        let raster = yuyv_to_rgb(&raw, self.width, self.height)?;
        Ok(CapturedFrame { raster, sequence })
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn stop(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!(device = %self.device_path, "released camera device");
        }
    }
}

fn classify_open_error(path: &str, e: &std::io::Error) -> StreamError {
    let kind = match e.kind() {
        std::io::ErrorKind::PermissionDenied => CameraErrorKind::PermissionDenied,
        std::io::ErrorKind::NotFound => CameraErrorKind::DeviceNotFound,
        _ if e.raw_os_error() == Some(EBUSY) => CameraErrorKind::DeviceBusy,
        _ => CameraErrorKind::Unknown,
    };
    StreamError::new(kind, format!("{path}: {e}"))
}

/// Convert packed YUYV 4:2:2 to RGB (BT.601, full range).
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Raster, StreamError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(StreamError::new(
            CameraErrorKind::Unknown,
            format!("YUYV buffer too short: expected {expected}, got {}", yuyv.len()),
        ));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        push_rgb(&mut rgb, y0, u, v);
        push_rgb(&mut rgb, y1, u, v);
    }

    Raster::from_rgb8(rgb, width, height).ok_or_else(|| {
        StreamError::new(
            CameraErrorKind::Unknown,
            "converted buffer length mismatch".to_string(),
        )
    })
}

fn push_rgb(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let y = y as f32;
    let cb = u as f32 - 128.0;
    let cr = v as f32 - 128.0;
    let r = y + 1.402 * cr;
    let g = y - 0.344 * cb - 0.714 * cr;
    let b = y + 1.772 * cb;
    out.push(r.round().clamp(0.0, 255.0) as u8);
    out.push(g.round().clamp(0.0, 255.0) as u8);
    out.push(b.round().clamp(0.0, 255.0) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: Y0=100, Y1=200, neutral chroma
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), [100, 100, 100]);
        assert_eq!(rgb.get_pixel(1, 0), [200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // Strong Cr pushes red up and green down.
        let yuyv = vec![128, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let p = rgb.get_pixel(0, 0);
        assert!(p[0] > 200, "red channel: {}", p[0]);
        assert!(p[1] < 128, "green channel: {}", p[1]);
    }

    #[test]
    fn test_yuyv_too_short() {
        let yuyv = vec![100, 128];
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_yuyv_dimensions() {
        let yuyv: Vec<u8> = vec![128; 4 * 2 * 2]; // 4x2 image
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.width(), 4);
        assert_eq!(rgb.height(), 2);
    }
}
