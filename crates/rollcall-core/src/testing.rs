//! Deterministic stand-ins for the model backends, for tests.

use crate::pipeline::{BackendError, FaceEmbedder, FaceLocator, FacePipeline};
use crate::types::{BoundingBox, FaceSignature, PersonRecord};
use image::RgbImage;

/// Box covering the whole image.
pub fn full_frame_box(image: &RgbImage) -> BoundingBox {
    BoundingBox {
        x: 0.0,
        y: 0.0,
        width: image.width() as f32,
        height: image.height() as f32,
        confidence: 0.99,
        landmarks: None,
    }
}

fn mean_channels(image: &RgbImage) -> [f32; 3] {
    let count = (image.width() * image.height()).max(1) as f32;
    let mut sums = [0.0f32; 3];
    for pixel in image.pixels() {
        for (sum, value) in sums.iter_mut().zip(pixel.0) {
            *sum += value as f32;
        }
    }
    sums.map(|s| s / count)
}

/// Reports one full-frame face when the mean brightness reaches `min_brightness`.
pub struct BrightFaceLocator {
    pub min_brightness: f32,
}

impl FaceLocator for BrightFaceLocator {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, BackendError> {
        let [r, g, b] = mean_channels(image);
        if image.width() == 0 || (r + g + b) / 3.0 < self.min_brightness {
            return Ok(Vec::new());
        }
        Ok(vec![full_frame_box(image)])
    }
}

/// Always returns the same boxes.
pub struct StaticLocator {
    pub faces: Vec<BoundingBox>,
}

impl FaceLocator for StaticLocator {
    fn locate(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, BackendError> {
        Ok(self.faces.clone())
    }
}

/// Signature = mean RGB of the image, each channel scaled to `0..=1`.
pub struct MeanColorEmbedder;

impl FaceEmbedder for MeanColorEmbedder {
    fn embed(&mut self, image: &RgbImage, _face: &BoundingBox) -> Result<FaceSignature, BackendError> {
        Ok(FaceSignature::new(
            mean_channels(image).iter().map(|c| c / 255.0).collect(),
        ))
    }
}

/// Always returns the same signature.
pub struct FixedEmbedder {
    pub signature: FaceSignature,
}

impl FaceEmbedder for FixedEmbedder {
    fn embed(&mut self, _image: &RgbImage, _face: &BoundingBox) -> Result<FaceSignature, BackendError> {
        Ok(self.signature.clone())
    }
}

/// Embedder that always fails, as when the embedder disagrees with the detector.
pub struct FailingEmbedder;

impl FaceEmbedder for FailingEmbedder {
    fn embed(&mut self, _image: &RgbImage, _face: &BoundingBox) -> Result<FaceSignature, BackendError> {
        Err(BackendError::new("fake", "no face found by embedder"))
    }
}

/// Every image has a face; signature is its mean colour.
pub fn mean_color_pipeline() -> FacePipeline {
    bright_face_pipeline(0.0)
}

/// Faces are only found in images at least `min_brightness` bright on average.
pub fn bright_face_pipeline(min_brightness: f32) -> FacePipeline {
    FacePipeline::new(
        Box::new(BrightFaceLocator { min_brightness }),
        Box::new(MeanColorEmbedder),
    )
}

/// Detector reports `faces`; every query embeds to `signature`.
pub fn fixed_pipeline(faces: Vec<BoundingBox>, signature: Vec<f32>) -> FacePipeline {
    FacePipeline::new(
        Box::new(StaticLocator { faces }),
        Box::new(FixedEmbedder {
            signature: FaceSignature::new(signature),
        }),
    )
}

/// Person whose eight signatures are given as plain vectors.
pub fn record(name: &str, signatures: Vec<Vec<f32>>) -> PersonRecord {
    PersonRecord {
        name: name.to_string(),
        signatures: signatures.into_iter().map(FaceSignature::new).collect(),
    }
}

/// Person whose eight signatures are all `signature`.
pub fn uniform_record(name: &str, signature: Vec<f32>) -> PersonRecord {
    record(name, vec![signature; crate::types::SIGNATURES_PER_PERSON])
}
