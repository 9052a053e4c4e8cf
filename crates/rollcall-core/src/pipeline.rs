//! Locate-then-embed pipeline that turns an image into a face signature.

use crate::types::{BoundingBox, FaceSignature};
use image::RgbImage;
use thiserror::Error;

/// Error raised by a face locator or embedder backend.
#[derive(Error, Debug)]
#[error("{backend}: {message}")]
pub struct BackendError {
    pub backend: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face detection failed: {0}")]
    Locate(#[source] BackendError),
    #[error("signature extraction failed: {0}")]
    Embed(#[source] BackendError),
}

/// Finds faces in an RGB image, best candidate first.
pub trait FaceLocator: Send {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, BackendError>;
}

/// Computes a signature for one located face.
pub trait FaceEmbedder: Send {
    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FaceSignature, BackendError>;
}

/// Detector + embedder pair used for both enrollment and recognition.
pub struct FacePipeline {
    locator: Box<dyn FaceLocator>,
    embedder: Box<dyn FaceEmbedder>,
}

impl FacePipeline {
    pub fn new(locator: Box<dyn FaceLocator>, embedder: Box<dyn FaceEmbedder>) -> Self {
        Self { locator, embedder }
    }

    /// Locate all faces in `image`.
    pub fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, PipelineError> {
        self.locator.locate(image).map_err(PipelineError::Locate)
    }

    /// Encode the first located face of `image`.
    pub fn encode(&mut self, image: &RgbImage) -> Result<FaceSignature, PipelineError> {
        let faces = self.locate(image)?;
        let face = faces.first().ok_or(PipelineError::NoFaceDetected)?;
        self.encode_region(image, face)
    }

    /// Encode an already located face.
    pub fn encode_region(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<FaceSignature, PipelineError> {
        self.embedder.embed(image, face).map_err(PipelineError::Embed)
    }
}

/// Load the SCRFD detector and ArcFace encoder from `model_dir`.
#[cfg(feature = "onnx")]
pub fn load_onnx_pipeline(model_dir: &std::path::Path) -> Result<FacePipeline, BackendError> {
    use crate::detector::{FaceDetector, SCRFD_MODEL_FILE};
    use crate::encoder::{FaceEncoder, ARCFACE_MODEL_FILE};

    let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))
        .map_err(|e| BackendError::new("scrfd", e.to_string()))?;
    let encoder = FaceEncoder::load(&model_dir.join(ARCFACE_MODEL_FILE))
        .map_err(|e| BackendError::new("arcface", e.to_string()))?;
    Ok(FacePipeline::new(Box::new(detector), Box::new(encoder)))
}
