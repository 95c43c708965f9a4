//! Capture lifecycle and V4L2 backend.
//!
//! [`FrameSource`] owns the open/read/close lifecycle over a priority-ordered
//! backend list. An open only commits to a backend after reading one real
//! frame from it; a backend that opens but never produces a frame falls
//! through to the next candidate.

use std::path::Path;

use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::frame::{self, Frame};

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("source is not open")]
    NotOpen,
    #[error("all capture backends failed")]
    AllBackendsFailed,
}

/// One way of opening a capture device. Backends are tried in priority order.
pub trait CaptureBackend: Send {
    fn name(&self) -> &str;
    fn open(&self) -> Result<Box<dyn CaptureHandle>, CameraError>;
}

/// A committed capture device, ready to produce frames.
pub trait CaptureHandle: Send {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Capture source lifecycle: closed until [`open`](FrameSource::open)
/// commits to a backend, open until [`close`](FrameSource::close) or a read
/// failure makes the caller close it.
pub struct FrameSource {
    backends: Vec<Box<dyn CaptureBackend>>,
    handle: Option<Box<dyn CaptureHandle>>,
}

impl FrameSource {
    pub fn new(backends: Vec<Box<dyn CaptureBackend>>) -> Self {
        Self {
            backends,
            handle: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Try each backend in priority order; commit to the first one that
    /// both opens and produces a readable frame.
    pub fn open(&mut self) -> Result<(), CameraError> {
        if self.handle.is_some() {
            return Ok(());
        }

        for backend in &self.backends {
            match backend.open() {
                Ok(mut handle) => match handle.read_frame() {
                    Ok(_) => {
                        tracing::info!(backend = backend.name(), "capture backend opened");
                        self.handle = Some(handle);
                        return Ok(());
                    }
                    Err(err) => {
                        tracing::warn!(
                            backend = backend.name(),
                            error = %err,
                            "backend opened but produced no readable frame"
                        );
                    }
                },
                Err(err) => {
                    tracing::warn!(backend = backend.name(), error = %err, "backend open failed");
                }
            }
        }

        Err(CameraError::AllBackendsFailed)
    }

    /// Read one frame. An error means the source should be closed and
    /// reopened by the caller.
    pub fn read(&mut self) -> Result<Frame, CameraError> {
        self.handle
            .as_mut()
            .ok_or(CameraError::NotOpen)?
            .read_frame()
    }

    /// Idempotent; always safe to call.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            tracing::info!("capture source closed");
        }
    }
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

/// V4L2 backend bound to one device path (e.g. "/dev/video0").
pub struct V4l2Backend {
    device_path: String,
}

impl V4l2Backend {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }
}

impl CaptureBackend for V4l2Backend {
    fn name(&self) -> &str {
        &self.device_path
    }

    fn open(&self) -> Result<Box<dyn CaptureHandle>, CameraError> {
        Ok(Box::new(V4l2Handle::open(&self.device_path)?))
    }
}

struct V4l2Handle {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl V4l2Handle {
    fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        // Request YUYV at 640x480; accept GREY or Y16 if the driver
        // negotiates those instead.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = 640;
        fmt.height = 480;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    fn buf_to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let pixels = (self.width * self.height) as usize;

        match self.pixel_format {
            PixelFormat::Grey => {
                if buf.len() < pixels {
                    return Err(CameraError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..pixels].to_vec())
            }
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("Y16 conversion failed: {e}"))),
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
        }
    }
}

impl CaptureHandle for V4l2Handle {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let gray = self.buf_to_grayscale(buf)?;

        Ok(Frame {
            data: gray,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_frame(sequence: u32) -> Frame {
        Frame {
            data: vec![128; 4],
            width: 2,
            height: 2,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }

    struct GoodHandle {
        reads: Arc<AtomicUsize>,
    }

    impl CaptureHandle for GoodHandle {
        fn read_frame(&mut self) -> Result<Frame, CameraError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(test_frame(n as u32))
        }
    }

    struct GoodBackend {
        opens: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
    }

    impl GoodBackend {
        fn new() -> Self {
            Self {
                opens: Arc::new(AtomicUsize::new(0)),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CaptureBackend for GoodBackend {
        fn name(&self) -> &str {
            "good"
        }
        fn open(&self) -> Result<Box<dyn CaptureHandle>, CameraError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(GoodHandle {
                reads: Arc::clone(&self.reads),
            }))
        }
    }

    struct FailingBackend;

    impl CaptureBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }
        fn open(&self) -> Result<Box<dyn CaptureHandle>, CameraError> {
            Err(CameraError::DeviceNotFound("/dev/missing".into()))
        }
    }

    struct DeadHandle;

    impl CaptureHandle for DeadHandle {
        fn read_frame(&mut self) -> Result<Frame, CameraError> {
            Err(CameraError::CaptureFailed("no buffer".into()))
        }
    }

    /// Opens fine but never yields a frame.
    struct NoFrameBackend;

    impl CaptureBackend for NoFrameBackend {
        fn name(&self) -> &str {
            "no-frame"
        }
        fn open(&self) -> Result<Box<dyn CaptureHandle>, CameraError> {
            Ok(Box::new(DeadHandle))
        }
    }

    #[test]
    fn falls_back_past_failing_backends() {
        let good = GoodBackend::new();
        let opens = Arc::clone(&good.opens);
        let mut source = FrameSource::new(vec![
            Box::new(FailingBackend),
            Box::new(NoFrameBackend),
            Box::new(good),
        ]);

        source.open().unwrap();
        assert!(source.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(source.read().is_ok());
    }

    #[test]
    fn open_without_readable_frame_is_not_committed() {
        let mut source = FrameSource::new(vec![Box::new(NoFrameBackend)]);
        assert!(matches!(source.open(), Err(CameraError::AllBackendsFailed)));
        assert!(!source.is_open());
    }

    #[test]
    fn all_backends_failing_is_an_error_not_a_panic() {
        let mut source =
            FrameSource::new(vec![Box::new(FailingBackend), Box::new(FailingBackend)]);
        assert!(matches!(source.open(), Err(CameraError::AllBackendsFailed)));
    }

    #[test]
    fn open_is_idempotent_while_open() {
        let good = GoodBackend::new();
        let opens = Arc::clone(&good.opens);
        let mut source = FrameSource::new(vec![Box::new(good)]);

        source.open().unwrap();
        source.open().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_when_closed_is_not_open() {
        let mut source = FrameSource::new(vec![Box::new(GoodBackend::new())]);
        assert!(matches!(source.read(), Err(CameraError::NotOpen)));
    }

    #[test]
    fn close_is_idempotent() {
        let mut source = FrameSource::new(vec![Box::new(GoodBackend::new())]);
        source.open().unwrap();
        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(matches!(source.read(), Err(CameraError::NotOpen)));
    }

    #[test]
    fn reopen_after_close_commits_again() {
        let good = GoodBackend::new();
        let opens = Arc::clone(&good.opens);
        let mut source = FrameSource::new(vec![Box::new(good)]);

        source.open().unwrap();
        source.close();
        source.open().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert!(source.is_open());
    }
}
