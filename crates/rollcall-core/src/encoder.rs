//! ArcFace signature encoder via ONNX Runtime.
//!
//! Extracts 512-dimensional face signatures from aligned face crops using
//! the w600k_r50 ArcFace model. Signatures are scaled to a Euclidean norm of
//! [`SIGNATURE_NORM`], which keeps the distance between any two of them in
//! `0..=1`.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::pipeline::{BackendError, FaceEmbedder};
use crate::types::{BoundingBox, FaceSignature};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// File name of the recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD
const ARCFACE_SIGNATURE_DIM: usize = 512;

/// Euclidean norm of every stored signature.
pub const SIGNATURE_NORM: f32 = 0.5;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based signature encoder.
pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EncoderError> {
        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Align the face to 112×112 and extract its signature.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<FaceSignature, EncoderError> {
        let landmarks = face.landmarks.as_ref().ok_or(EncoderError::NoLandmarks)?;
        let aligned = alignment::align_face(image, landmarks);
        let input = Self::preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("signature extraction: {e}")))?;

        if raw.len() != ARCFACE_SIGNATURE_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {ARCFACE_SIGNATURE_DIM}-dim signature, got {}",
                raw.len()
            )));
        }

        Ok(FaceSignature::new(normalize_to(raw, SIGNATURE_NORM)))
    }

    /// Convert an aligned RGB crop into a normalized NCHW tensor.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let size = ALIGNED_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in aligned.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
        tensor
    }
}

impl FaceEmbedder for FaceEncoder {
    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FaceSignature, BackendError> {
        self.extract(image, face)
            .map_err(|e| BackendError::new("arcface", e.to_string()))
    }
}

fn normalize_to(raw: &[f32], target: f32) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x * target / norm).collect()
    } else {
        raw.to_vec()
    }
}
