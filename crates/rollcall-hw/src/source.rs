//! Frame sources: anything the recognition loop can pull frames from.

use crate::frame::Frame;
use image::RgbImage;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("no more frames")]
    EndOfStream,
}

/// Blocking producer of RGB frames.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Replays one still image, optionally paced and limited to a number of frames.
pub struct StillSource {
    image: RgbImage,
    label: String,
    interval: Duration,
    remaining: Option<u32>,
    sequence: u32,
}

impl StillSource {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            label: "still image".to_string(),
            interval: Duration::ZERO,
            remaining: None,
            sequence: 0,
        }
    }

    /// Load an image file and replay it.
    pub fn open(path: &Path) -> Result<Self, CameraError> {
        let image = image::open(path)
            .map_err(|e| CameraError::DeviceNotFound(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let mut source = Self::new(image);
        source.label = path.display().to_string();
        Ok(source)
    }

    /// Sleep `interval` before each frame, like a camera's frame period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Return [`CameraError::EndOfStream`] after `frames` frames.
    pub fn limit(mut self, frames: u32) -> Self {
        self.remaining = Some(frames);
        self
    }
}

impl FrameSource for StillSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(CameraError::EndOfStream);
            }
            *remaining -= 1;
        }
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Frame::new(self.image.clone(), self.sequence))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_still_source_limit() {
        let mut source = StillSource::new(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]))).limit(2);
        assert_eq!(source.next_frame().unwrap().sequence, 1);
        let second = source.next_frame().unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.image.get_pixel(3, 3).0, [1, 2, 3]);
        assert!(matches!(source.next_frame(), Err(CameraError::EndOfStream)));
    }

    #[test]
    fn test_still_source_missing_file() {
        let err = StillSource::open(Path::new("/nonexistent/face.png")).err().unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }

    #[test]
    fn test_boxed_source() {
        let mut source: Box<dyn FrameSource> = Box::new(StillSource::new(RgbImage::new(2, 2)));
        assert_eq!(source.describe(), "still image");
        assert!(source.next_frame().is_ok());
    }
}
