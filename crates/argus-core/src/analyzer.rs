//! Combined detect-and-encode pipeline behind the [`FaceAnalyzer`] seam.
//!
//! The gallery loader and the feed loop both consume this trait, so their
//! logic can be tested with stub analyzers while production wires in the
//! ONNX pair.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::DetectedFace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
}

/// Detect every face in an RGB frame and compute its encoding.
pub trait FaceAnalyzer {
    fn analyze(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, AnalyzerError>;
}

/// Production analyzer: SCRFD detection followed by ArcFace encoding.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxFaceAnalyzer {
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, AnalyzerError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            embedder: FaceEmbedder::load(embedder_path)?,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let boxes = self.detector.detect(rgb, width, height)?;
        let mut faces = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            match self.embedder.encode(rgb, width, height, &bbox) {
                Ok(encoding) => faces.push(DetectedFace { bbox, encoding }),
                // One bad face never sinks the frame.
                Err(e) => tracing::warn!(error = %e, "skipping unencodable face"),
            }
        }

        Ok(faces)
    }
}
