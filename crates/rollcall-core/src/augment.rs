//! Brightness augmentation for enrollment photos.
//!
//! Each enrollment photo is expanded into a fixed set of brightness-scaled
//! copies so that one person's signature set tolerates lighting changes.

use crate::types::AUGMENTATION_FACTORS;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AugmentError {
    #[error("invalid image: {width}x{height}")]
    InvalidImage { width: u32, height: u32 },
}

/// Ordered brightness variants of one source image, one per factor in
/// [`AUGMENTATION_FACTORS`].
#[derive(Debug, Clone)]
pub struct AugmentationSet {
    variants: Vec<RgbImage>,
}

impl AugmentationSet {
    pub fn variants(&self) -> &[RgbImage] {
        &self.variants
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Iterate `(factor, variant)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (f32, &RgbImage)> {
        AUGMENTATION_FACTORS.iter().copied().zip(self.variants.iter())
    }
}

/// Produce the brightness variants of `image`.
pub fn augment(image: &RgbImage) -> Result<AugmentationSet, AugmentError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(AugmentError::InvalidImage { width, height });
    }

    let variants = AUGMENTATION_FACTORS
        .iter()
        .map(|&factor| scale_brightness(image, factor))
        .collect();

    Ok(AugmentationSet { variants })
}

/// Scale every channel linearly by `factor`, rounding and saturating to `0..=255`.
pub fn scale_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for value in out.iter_mut() {
        *value = (*value as f32 * factor).round().clamp(0.0, 255.0) as u8;
    }
    out
}
