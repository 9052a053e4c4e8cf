//! rollcall-core: face enrollment, recognition and attendance bookkeeping.
//!
//! Faces are located with SCRFD and encoded with ArcFace (ONNX Runtime, CPU).
//! Each enrolled person is stored as eight signatures taken from brightness
//! variants of one photo; live frames are matched against them and confirmed
//! matches are written to a per-session attendance file.

pub mod alignment;
pub mod annotate;
pub mod augment;
pub mod codec;
#[cfg(feature = "onnx")]
pub mod detector;
#[cfg(feature = "onnx")]
pub mod encoder;
pub mod ledger;
pub mod library;
pub mod matcher;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod retry;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;

use std::path::PathBuf;

pub use annotate::Annotator;
pub use ledger::{Ledger, MarkOutcome, SessionFile, SessionWindow, WindowPrompt};
pub use library::ImageLibrary;
pub use matcher::{ExhaustiveMatcher, MatchStrategy, Matcher, TwoPassMatcher};
pub use pipeline::{FaceEmbedder, FaceLocator, FacePipeline};
pub use recognizer::{Recognizer, RecognizerConfig};
pub use retry::RetryPolicy;
pub use store::EnrollmentStore;
pub use types::{BoundingBox, FaceSignature, IdentityDecision, PersonRecord};

/// Directory searched for `det_10g.onnx` and `w600k_r50.onnx` when none is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}
