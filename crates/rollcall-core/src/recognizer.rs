//! Frame → identity decision.

use crate::augment::AugmentError;
use crate::matcher::{confidence_from_distance, MatchStrategy, Matcher};
use crate::pipeline::{FacePipeline, PipelineError};
use crate::preprocess::{prepare_recognition, DETECTION_SCALE};
use crate::types::{IdentityDecision, PersonRecord};
use image::RgbImage;
use thiserror::Error;

/// Default acceptance threshold; confidence must be strictly above it.
pub const DEFAULT_MIN_CONFIDENCE: u8 = 50;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] AugmentError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("face signature has {query} values but enrolled signatures have {enrolled}; re-enroll with the current model")]
    DimensionMismatch { query: usize, enrolled: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognizerConfig {
    pub min_confidence: u8,
    pub strategy: MatchStrategy,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            strategy: MatchStrategy::default(),
        }
    }
}

pub struct Recognizer {
    pipeline: FacePipeline,
    matcher: Box<dyn Matcher>,
    min_confidence: u8,
}

impl Recognizer {
    pub fn new(pipeline: FacePipeline, config: RecognizerConfig) -> Self {
        Self {
            pipeline,
            matcher: config.strategy.matcher(),
            min_confidence: config.min_confidence,
        }
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    /// Shared pipeline, also used for enrollment while recognition is paused.
    pub fn pipeline_mut(&mut self) -> &mut FacePipeline {
        &mut self.pipeline
    }

    /// Identify the first face in `frame` against `gallery`.
    ///
    /// Only the first located face is considered. An embedding failure after
    /// a successful detection is returned as an error.
    pub fn identify(
        &mut self,
        frame: &RgbImage,
        gallery: &[PersonRecord],
    ) -> Result<IdentityDecision, RecognizerError> {
        let small = prepare_recognition(frame)?;
        let faces = self.pipeline.locate(&small)?;
        let Some(face) = faces.into_iter().next() else {
            return Ok(IdentityDecision::no_face());
        };
        let full_frame_face = face.scaled(DETECTION_SCALE as f32);

        if gallery.is_empty() {
            return Ok(IdentityDecision::unknown(full_frame_face, 0));
        }

        let query = self.pipeline.encode_region(&small, &face)?;
        if let Some(enrolled) = gallery
            .iter()
            .flat_map(|record| &record.signatures)
            .find(|signature| signature.dimension() != query.dimension())
        {
            return Err(RecognizerError::DimensionMismatch {
                query: query.dimension(),
                enrolled: enrolled.dimension(),
            });
        }
        let Some(best) = self.matcher.best_match(&query, gallery) else {
            return Ok(IdentityDecision::unknown(full_frame_face, 0));
        };

        let confidence = confidence_from_distance(best.distance);
        let name = gallery[best.index].name.clone();
        tracing::debug!(candidate = %name, distance = best.distance, confidence, "matched face");

        if confidence > self.min_confidence {
            Ok(IdentityDecision {
                name: Some(name),
                confidence,
                face: Some(full_frame_face),
            })
        } else {
            Ok(IdentityDecision::unknown(full_frame_face, confidence))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bright_face_pipeline, fixed_pipeline, uniform_record, FailingEmbedder, StaticLocator};
    use crate::types::BoundingBox;
    use image::Rgb;

    fn face_at(x: f32, y: f32, side: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: side,
            height: side,
            confidence: 0.9,
            landmarks: None,
        }
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(80, 80, Rgb([120, 120, 120]))
    }

    fn recognizer(query: Vec<f32>) -> Recognizer {
        Recognizer::new(
            fixed_pipeline(vec![face_at(5.0, 5.0, 10.0)], query),
            RecognizerConfig::default(),
        )
    }

    #[test]
    fn test_identical_query_is_full_confidence() {
        let gallery = vec![uniform_record("Alice", vec![0.2, 0.4])];
        let decision = recognizer(vec![0.2, 0.4]).identify(&frame(), &gallery).unwrap();
        assert_eq!(decision.name.as_deref(), Some("Alice"));
        assert_eq!(decision.confidence, 100);
    }

    #[test]
    fn test_far_query_has_no_name() {
        let gallery = vec![uniform_record("Alice", vec![0.0, 0.0])];
        let decision = recognizer(vec![3.0, 4.0]).identify(&frame(), &gallery).unwrap();
        assert_eq!(decision.name, None);
        assert_eq!(decision.confidence, 0);
        assert!(decision.face.is_some());
    }

    #[test]
    fn test_threshold_is_strict() {
        let gallery = vec![uniform_record("Alice", vec![0.0, 0.0])];
        let decision = recognizer(vec![0.5, 0.0]).identify(&frame(), &gallery).unwrap();
        assert_eq!(decision.confidence, 50);
        assert_eq!(decision.name, None);

        let decision = recognizer(vec![0.45, 0.0]).identify(&frame(), &gallery).unwrap();
        assert_eq!(decision.confidence, 55);
        assert_eq!(decision.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_empty_gallery_reports_box_only() {
        let decision = recognizer(vec![0.1]).identify(&frame(), &[]).unwrap();
        assert_eq!(decision.name, None);
        assert_eq!(decision.confidence, 0);
        assert!(decision.face.is_some());
    }

    #[test]
    fn test_no_face() {
        let mut recognizer = Recognizer::new(bright_face_pipeline(200.0), RecognizerConfig::default());
        let gallery = vec![uniform_record("Alice", vec![0.5, 0.5, 0.5])];
        let decision = recognizer.identify(&frame(), &gallery).unwrap();
        assert_eq!(decision, IdentityDecision::no_face());
    }

    #[test]
    fn test_box_scaled_to_full_frame() {
        let gallery = vec![uniform_record("Alice", vec![1.0])];
        let decision = recognizer(vec![1.0]).identify(&frame(), &gallery).unwrap();
        let face = decision.face.unwrap();
        assert_eq!((face.x, face.y, face.width, face.height), (20.0, 20.0, 40.0, 40.0));
    }

    #[test]
    fn test_embedder_failure_is_error() {
        let pipeline = FacePipeline::new(
            Box::new(StaticLocator {
                faces: vec![face_at(0.0, 0.0, 4.0)],
            }),
            Box::new(FailingEmbedder),
        );
        let mut recognizer = Recognizer::new(pipeline, RecognizerConfig::default());
        let gallery = vec![uniform_record("Alice", vec![1.0])];
        assert!(matches!(
            recognizer.identify(&frame(), &gallery),
            Err(RecognizerError::Pipeline(PipelineError::Embed(_)))
        ));
    }

    #[test]
    fn test_signature_length_must_match_gallery() {
        let gallery = vec![uniform_record("Alice", vec![0.1, 0.2])];
        assert!(matches!(
            recognizer(vec![0.1, 0.2, 9.0]).identify(&frame(), &gallery),
            Err(RecognizerError::DimensionMismatch { query: 3, enrolled: 2 })
        ));
        assert!(matches!(
            recognizer(vec![0.1]).identify(&frame(), &gallery),
            Err(RecognizerError::DimensionMismatch { query: 1, enrolled: 2 })
        ));
    }

    #[test]
    fn test_tiny_frame_rejected() {
        let mut r = recognizer(vec![1.0]);
        let tiny = RgbImage::new(1, 1);
        assert!(matches!(r.identify(&tiny, &[]), Err(RecognizerError::InvalidFrame(_))));
    }

    #[test]
    fn test_custom_threshold() {
        let gallery = vec![uniform_record("Alice", vec![0.0])];
        let mut r = Recognizer::new(
            fixed_pipeline(vec![face_at(0.0, 0.0, 4.0)], vec![0.2]),
            RecognizerConfig {
                min_confidence: 90,
                strategy: MatchStrategy::Exhaustive,
            },
        );
        let decision = r.identify(&frame(), &gallery).unwrap();
        assert_eq!(decision.confidence, 80);
        assert_eq!(decision.name, None);
    }
}
