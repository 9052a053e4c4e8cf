//! Frame type and pixel-format conversion to canonical RGB.

use image::RgbImage;
use std::time::Instant;

/// A captured camera frame in canonical RGB order.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        Self {
            image,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Build a frame from packed 3-byte pixels in `order`.
    pub fn from_raw(
        data: &[u8],
        width: u32,
        height: u32,
        order: ChannelOrder,
        sequence: u32,
    ) -> Result<Self, FrameError> {
        let rgb = to_canonical_rgb(data, width, height, order)?;
        let image = RgbImage::from_raw(width, height, rgb)
            .ok_or(FrameError::InvalidDimensions { width, height })?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Byte order of a packed 24-bit pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Copy packed 24-bit pixels into RGB order.
pub fn to_canonical_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    order: ChannelOrder,
) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 3) as usize;
    check_len(data, expected)?;
    let pixels = &data[..expected];
    Ok(match order {
        ChannelOrder::Rgb => pixels.to_vec(),
        ChannelOrder::Bgr => pixels
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
    })
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    check_len(yuyv, expected)?;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.392 * d - 0.813 * e),
        clamp(c + 2.017 * d),
    ]
}

/// Expand 8-bit grayscale to RGB.
pub fn gray_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    check_len(gray, expected)?;
    Ok(gray[..expected].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Expand 16-bit little-endian grayscale to RGB, keeping the high byte.
pub fn y16_to_rgb(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    check_len(y16, expected)?;
    let gray: Vec<u8> = y16[..expected].chunks_exact(2).map(|px| px[1]).collect();
    gray_to_rgb(&gray, width, height)
}

fn check_len(data: &[u8], expected: usize) -> Result<(), FrameError> {
    if data.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_swapped_to_rgb() {
        let bgr = vec![1, 2, 3, 10, 20, 30];
        let frame = Frame::from_raw(&bgr, 2, 1, ChannelOrder::Bgr, 7).unwrap();
        assert_eq!(frame.image.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(frame.image.get_pixel(1, 0).0, [30, 20, 10]);
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_rgb_passthrough_ignores_trailing_bytes() {
        let rgb = vec![9, 8, 7, 0xff];
        assert_eq!(to_canonical_rgb(&rgb, 1, 1, ChannelOrder::Rgb).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: [Y0=16 (black), U=128, Y1=235 (white), V=128]
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_red() {
        // BT.601 limited-range pure red: Y=81, Cb=90, Cr=240
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        assert!(rgb[0] > 250, "red channel {}", rgb[0]);
        assert!(rgb[1] < 5, "green channel {}", rgb[1]);
        assert!(rgb[2] < 5, "blue channel {}", rgb[2]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_gray_and_y16() {
        assert_eq!(gray_to_rgb(&[5, 6], 2, 1).unwrap(), vec![5, 5, 5, 6, 6, 6]);
        // 0x8040 little-endian → high byte 0x80
        assert_eq!(y16_to_rgb(&[0x40, 0x80], 1, 1).unwrap(), vec![0x80, 0x80, 0x80]);
    }
}
