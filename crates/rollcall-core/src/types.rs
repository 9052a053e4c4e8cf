use serde::{Deserialize, Serialize};

/// Brightness factors applied during enrollment, in storage order.
pub const AUGMENTATION_FACTORS: [f32; 8] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

/// Number of signatures stored per enrolled person.
pub const SIGNATURES_PER_PERSON: usize = AUGMENTATION_FACTORS.len();

/// Index of the unscaled (factor 1.0) variant, used as the first-pass candidate filter.
pub const PRIMARY_INDEX: usize = 3;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Map a box (and its landmarks) from a downscaled image back to the source image.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }
}

/// Face signature (embedding) vector.
///
/// 512-dimensional for the bundled ArcFace model. Every signature held by one
/// store shares the same dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSignature {
    pub values: Vec<f32>,
}

impl FaceSignature {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two signatures.
    ///
    /// Both must have the same dimension; extra values on the longer side
    /// are ignored.
    pub fn euclidean_distance(&self, other: &FaceSignature) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled person: a unique name and one signature per augmentation factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub signatures: Vec<FaceSignature>,
}

impl PersonRecord {
    /// Signature of the unscaled enrollment variant.
    pub fn primary(&self) -> Option<&FaceSignature> {
        self.signatures.get(PRIMARY_INDEX)
    }
}

/// Outcome of recognizing one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IdentityDecision {
    /// Matched person, `None` when unknown.
    pub name: Option<String>,
    /// Match confidence in `0..=100`.
    pub confidence: u8,
    /// Located face in full-frame coordinates, `None` when no face was found.
    pub face: Option<BoundingBox>,
}

impl IdentityDecision {
    /// Decision for a frame with no located face.
    pub fn no_face() -> Self {
        Self::default()
    }

    /// Decision for a located face that could not be attributed to anyone.
    pub fn unknown(face: BoundingBox, confidence: u8) -> Self {
        Self {
            name: None,
            confidence,
            face: Some(face),
        }
    }

    /// Name as handed to the attendance ledger (empty when unknown).
    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Text drawn above the face rectangle.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} {}%", self.confidence),
            None => "Unknown".to_string(),
        }
    }
}
