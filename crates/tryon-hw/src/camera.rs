//! Live frames from a V4L2 webcam.

use crate::frame::{self, Frame, FrameError};
use crate::FrameSource;
use image::RgbaImage;
use std::io;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// Mmap buffers queued with the driver.
const STREAM_BUFFERS: u32 = 4;

/// Highest `/dev/videoN` index checked by [`Camera::list_devices`].
const MAX_VIDEO_NODES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    NotFound(String),
    #[error("camera {0} is in use by another process")]
    Busy(String),
    #[error("{0} cannot capture video")]
    NotACaptureDevice(String),
    #[error("pixel format: {0}")]
    Format(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl CameraError {
    fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| CameraError::Io { context, source }
    }
}

/// A capture-capable node found under `/dev`.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// Pixel layouts the camera may hand back; all are expanded to RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUV 4:2:2, what nearly every UVC webcam offers.
    Yuyv,
    Rgb24,
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"GREY" => Some(PixelFormat::Grey),
            _ => None,
        }
    }

    fn to_rgba(self, buf: &[u8], width: u32, height: u32) -> Result<RgbaImage, FrameError> {
        match self {
            PixelFormat::Yuyv => frame::yuyv_to_rgba(buf, width, height),
            PixelFormat::Rgb24 => frame::rgb24_to_rgba(buf, width, height),
            PixelFormat::Grey => frame::grey_to_rgba(buf, width, height),
        }
    }
}

/// An open webcam with its mmap stream already running.
pub struct Camera {
    // Field order matters: the stream must be dropped before the device.
    stream: MmapStream<'static>,
    _device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and start streaming, asking the driver for YUYV at
    /// `width`x`height`. The driver may pick a different size; the
    /// negotiated one is stored on the camera.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.raw_os_error() {
            // EBUSY
            Some(16) => CameraError::Busy(device_path.to_string()),
            _ => CameraError::NotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(CameraError::io("querying capabilities"))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotACaptureDevice(device_path.to_string()));
        }

        let format = negotiate(&device, width, height)?;
        let pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
            CameraError::Format(format!(
                "driver offered {}, expected YUYV, RGB3 or GREY",
                format.fourcc
            ))
        })?;

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(CameraError::io("starting mmap stream"))?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            driver = %caps.driver,
            width = format.width,
            height = format.height,
            format = ?pixel_format,
            "camera streaming"
        );

        Ok(Self {
            stream,
            _device: device,
            width: format.width,
            height: format.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Capture-capable nodes among `/dev/video0..15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                    })
            })
            .collect()
    }
}

fn negotiate(device: &Device, width: u32, height: u32) -> Result<Format, CameraError> {
    let mut wanted = device
        .format()
        .map_err(CameraError::io("reading current format"))?;
    wanted.fourcc = FourCC::new(b"YUYV");
    wanted.width = width;
    wanted.height = height;
    let got = device
        .set_format(&wanted)
        .map_err(CameraError::io("setting format"))?;
    if (got.width, got.height) != (width, height) {
        tracing::debug!(
            requested = ?(width, height),
            negotiated = ?(got.width, got.height),
            "driver adjusted capture size"
        );
    }
    Ok(got)
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (format, width, height) = (self.pixel_format, self.width, self.height);
        let (buf, meta) = self
            .stream
            .next()
            .map_err(CameraError::io("dequeuing buffer"))?;
        let sequence = meta.sequence;
        let image = format.to_rgba(buf, width, height)?;
        Ok(Frame {
            image,
            timestamp: Instant::now(),
            sequence,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_fourccs() {
        let cases = [
            (b"YUYV", Some(PixelFormat::Yuyv)),
            (b"RGB3", Some(PixelFormat::Rgb24)),
            (b"GREY", Some(PixelFormat::Grey)),
            (b"MJPG", None),
        ];
        for (code, expected) in cases {
            assert_eq!(PixelFormat::from_fourcc(FourCC::new(code)), expected);
        }
    }

    #[test]
    fn test_grey_buffer_expands_to_rgba() {
        let img = PixelFormat::Grey.to_rgba(&[0, 128, 255, 7], 2, 2).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/video-does-not-exist", 640, 480)
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::NotFound(_)));
    }
}
