//! Image preparation shared by enrollment and recognition.
//!
//! Enrollment: center crop → canonical RGB → Gaussian blur.
//! Recognition: quarter downscale → Gaussian blur. Frames reach the
//! recognizer already in canonical RGB order.

use crate::augment::AugmentError;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use imageproc::filter::separable_filter_equal;

/// Denoising kernel size (taps per axis).
pub const BLUR_KERNEL_SIZE: usize = 15;
/// Denoising kernel standard deviation.
pub const BLUR_SIGMA: f32 = 1.0;
/// Linear downscale applied to live frames before detection.
pub const DETECTION_SCALE: u32 = 4;

/// Crop the centered square of side `min(width, height)`.
pub fn center_crop(image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    image.crop_imm(x, y, side, side)
}

/// Normalized 1-D Gaussian kernel with `size` taps.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let center = (size as f32 - 1.0) / 2.0;
    let denom = 2.0 * sigma * sigma;
    let raw: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// Fixed Gaussian denoise (kernel 15, sigma 1).
pub fn denoise(image: &RgbImage) -> RgbImage {
    let kernel = gaussian_kernel(BLUR_KERNEL_SIZE, BLUR_SIGMA);
    separable_filter_equal(image, &kernel)
}

/// Prepare an enrollment photo for augmentation.
pub fn prepare_enrollment(image: &DynamicImage) -> Result<RgbImage, AugmentError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(AugmentError::InvalidImage {
            width: image.width(),
            height: image.height(),
        });
    }
    let cropped = center_crop(image);
    let rgb = cropped.to_rgb8();
    Ok(denoise(&rgb))
}

/// Prepare a live frame for the detector: quarter resolution, then blur.
pub fn prepare_recognition(frame: &RgbImage) -> Result<RgbImage, AugmentError> {
    let (width, height) = frame.dimensions();
    let small_w = scaled_dimension(width);
    let small_h = scaled_dimension(height);
    if small_w == 0 || small_h == 0 {
        return Err(AugmentError::InvalidImage { width, height });
    }
    let small = image::imageops::resize(frame, small_w, small_h, FilterType::Triangle);
    Ok(denoise(&small))
}

fn scaled_dimension(value: u32) -> u32 {
    (value as f32 / DETECTION_SCALE as f32).round() as u32
}
