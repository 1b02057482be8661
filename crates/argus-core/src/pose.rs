//! Body-pose landmark estimation via MoveNet single-pose (ONNX Runtime).
//!
//! The model consumes a 192×192 RGB crop and produces 17 COCO keypoints as
//! `(y, x, score)` triples normalized to the crop. The feed loop hands it a
//! padded region of interest around each detected face, so the landmarks are
//! per-person even with several people in frame.

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const MOVENET_INPUT_SIZE: usize = 192;
/// Keypoints per pose (COCO order).
pub const KEYPOINT_COUNT: usize = 17;
/// Minimum top keypoint score for the crop to count as containing a person.
const PRESENCE_FLOOR: f32 = 0.25;
/// A landmark participates in classification only above this score.
pub const VISIBILITY_THRESHOLD: f32 = 0.7;

// COCO keypoint indices (MoveNet output order).
const NOSE: usize = 0;
const LEFT_EAR: usize = 3;
const RIGHT_EAR: usize = 4;
const LEFT_SHOULDER: usize = 5;
const RIGHT_SHOULDER: usize = 6;
const LEFT_WRIST: usize = 9;
const RIGHT_WRIST: usize = 10;
const LEFT_HIP: usize = 11;
const RIGHT_HIP: usize = 12;

#[derive(Error, Debug)]
pub enum PoseError {
    #[error("model file not found: {0} — export MoveNet singlepose to ONNX and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One body landmark, normalized to the analyzed region ([0, 1] on both axes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl Landmark {
    pub fn is_visible(&self) -> bool {
        self.score > VISIBILITY_THRESHOLD
    }
}

/// Full set of 17 COCO keypoints for one person.
#[derive(Debug, Clone)]
pub struct PoseLandmarks {
    points: [Landmark; KEYPOINT_COUNT],
}

impl PoseLandmarks {
    pub fn new(points: [Landmark; KEYPOINT_COUNT]) -> Self {
        Self { points }
    }

    pub fn nose(&self) -> Landmark {
        self.points[NOSE]
    }
    pub fn left_ear(&self) -> Landmark {
        self.points[LEFT_EAR]
    }
    pub fn right_ear(&self) -> Landmark {
        self.points[RIGHT_EAR]
    }
    pub fn left_shoulder(&self) -> Landmark {
        self.points[LEFT_SHOULDER]
    }
    pub fn right_shoulder(&self) -> Landmark {
        self.points[RIGHT_SHOULDER]
    }
    pub fn left_wrist(&self) -> Landmark {
        self.points[LEFT_WRIST]
    }
    pub fn right_wrist(&self) -> Landmark {
        self.points[RIGHT_WRIST]
    }
    pub fn left_hip(&self) -> Landmark {
        self.points[LEFT_HIP]
    }
    pub fn right_hip(&self) -> Landmark {
        self.points[RIGHT_HIP]
    }
}

/// Seam between the feed loop and the landmark model, so orchestration
/// tests can run against a stub instead of a live ONNX session.
pub trait PoseEstimator {
    /// Estimate landmarks for the person in an RGB crop.
    ///
    /// `Ok(None)` means the crop contains no detectable person.
    fn estimate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<PoseLandmarks>, PoseError>;
}

/// MoveNet-backed estimator.
pub struct MoveNetEstimator {
    session: Session,
}

impl MoveNetEstimator {
    pub fn load(model_path: &str) -> Result<Self, PoseError> {
        if !Path::new(model_path).exists() {
            return Err(PoseError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded MoveNet pose model");

        Ok(Self { session })
    }

    /// Stretch-resize an interleaved RGB crop into the NHWC int32 tensor
    /// MoveNet expects. Aspect distortion is acceptable: the classifier only
    /// compares landmark positions relative to each other within the crop.
    fn preprocess(rgb: &[u8], width: usize, height: usize) -> Array4<i32> {
        let size = MOVENET_INPUT_SIZE;
        let mut tensor = Array4::<i32>::zeros((1, size, size, 3));

        if width == 0 || height == 0 {
            return tensor;
        }

        let x_step = width as f32 / size as f32;
        let y_step = height as f32 / size as f32;

        for y in 0..size {
            let src_y = ((y as f32 + 0.5) * y_step) as usize;
            let src_y = src_y.min(height - 1);
            for x in 0..size {
                let src_x = ((x as f32 + 0.5) * x_step) as usize;
                let src_x = src_x.min(width - 1);
                let base = (src_y * width + src_x) * 3;
                for c in 0..3 {
                    tensor[[0, y, x, c]] = rgb.get(base + c).copied().unwrap_or(0) as i32;
                }
            }
        }

        tensor
    }
}

impl PoseEstimator for MoveNetEstimator {
    fn estimate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<PoseLandmarks>, PoseError> {
        let input = Self::preprocess(rgb, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseError::InferenceFailed(format!("keypoint extraction: {e}")))?;

        if raw.len() < KEYPOINT_COUNT * 3 {
            return Err(PoseError::InferenceFailed(format!(
                "expected {} keypoint values, got {}",
                KEYPOINT_COUNT * 3,
                raw.len()
            )));
        }

        let landmarks = decode_keypoints(raw);
        Ok(landmarks)
    }
}

/// Decode a flat `[1, 1, 17, 3]` MoveNet output — `(y, x, score)` per
/// keypoint — into landmarks, or `None` when no keypoint clears the
/// presence floor.
fn decode_keypoints(raw: &[f32]) -> Option<PoseLandmarks> {
    let mut points = [Landmark {
        x: 0.0,
        y: 0.0,
        score: 0.0,
    }; KEYPOINT_COUNT];

    let mut best_score = 0.0f32;
    for (i, point) in points.iter_mut().enumerate() {
        let off = i * 3;
        *point = Landmark {
            y: raw[off],
            x: raw[off + 1],
            score: raw[off + 2],
        };
        best_score = best_score.max(point.score);
    }

    if best_score < PRESENCE_FLOOR {
        return None;
    }

    Some(PoseLandmarks::new(points))
}
