//! argus-core — Face matching and activity analysis engine.
//!
//! Uses SCRFD for face detection, ArcFace for face embeddings and MoveNet
//! for body-pose landmarks, all running via ONNX Runtime for CPU inference.
//! The matching, classification and geometry logic on top is pure and
//! model-free.

pub mod activity;
pub mod analyzer;
pub mod detector;
pub mod embedder;
pub mod gallery;
pub mod pose;
pub mod roi;
pub mod types;

pub use activity::{classify, Activity, Side};
pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxFaceAnalyzer};
pub use gallery::{Gallery, GalleryError};
pub use pose::{MoveNetEstimator, PoseEstimator, PoseLandmarks};
pub use types::{
    DetectedFace, Encoding, FaceBox, GalleryEntry, MatchOutcome, Matcher, NearestMatcher,
    UNKNOWN_IDENTITY,
};
