//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, ChannelOrder, Frame};
use crate::source::{CameraError, FrameSource};
use image::RgbImage;
use std::path::Path;
use std::time::Duration;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(2);
/// Linux `EBUSY`.
const EBUSY: i32 = 16;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb3,
    /// Packed 24-bit BGR.
    Bgr3,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb3),
            b"BGR3" => Some(PixelFormat::Bgr3),
            b"GREY" => Some(PixelFormat::Grey),
            b"Y16 " | b"Y16\0" => Some(PixelFormat::Y16),
            _ => None,
        }
    }
}

/// V4L2 camera device handle with a persistent capture stream.
pub struct Camera {
    stream: Option<MmapStream<'static>>,
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera and ask for YUYV at `width`×`height`.
    ///
    /// The driver may pick a different size or one of the other supported
    /// formats; whatever it negotiates is used as is.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(EBUSY) || e.to_string().contains("busy") {
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
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, RGB3, BGR3, GREY or Y16)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            stream: None,
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Dequeue one frame and convert it to RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stream.is_none() {
            let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
            stream.set_timeout(DEQUEUE_TIMEOUT);
            self.stream = Some(stream);
        }
        let (width, height, pixel_format) = (self.width, self.height, self.pixel_format);
        let Some(stream) = self.stream.as_mut() else {
            return Err(CameraError::CaptureFailed("capture stream unavailable".into()));
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;
        let rgb = buf_to_rgb(buf, width, height, pixel_format)?;
        let image = RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
            CameraError::CaptureFailed(format!("frame does not fit {width}x{height}"))
        })?;
        Ok(Frame::new(image, sequence))
    }

    /// Capture-capable devices among `/dev/video0` to `/dev/video15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }

    fn describe(&self) -> String {
        format!("{} ({}x{} {:?})", self.device_path, self.width, self.height, self.pixel_format)
    }
}

/// Convert a raw buffer to RGB based on the negotiated format.
fn buf_to_rgb(
    buf: &[u8],
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
) -> Result<Vec<u8>, CameraError> {
    let converted = match pixel_format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
        PixelFormat::Rgb3 => frame::to_canonical_rgb(buf, width, height, ChannelOrder::Rgb),
        PixelFormat::Bgr3 => frame::to_canonical_rgb(buf, width, height, ChannelOrder::Bgr),
        PixelFormat::Grey => frame::gray_to_rgb(buf, width, height),
        PixelFormat::Y16 => frame::y16_to_rgb(buf, width, height),
    };
    converted.map_err(|e| CameraError::CaptureFailed(format!("{pixel_format:?} conversion failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"BGR3")), Some(PixelFormat::Bgr3));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_buf_to_rgb_short_buffer() {
        let err = buf_to_rgb(&[0; 3], 2, 2, PixelFormat::Grey).unwrap_err();
        assert!(matches!(err, CameraError::CaptureFailed(_)));
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            Camera::open("/dev/does-not-exist", 640, 480),
            Err(CameraError::DeviceNotFound(_))
        ));
    }
}
