//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the anchor-free SCRFD model on RGB frames: letterbox into the fixed
//! model input, decode per-stride score/offset tensors against the anchor
//! centers, then non-maximum suppression. Keypoint outputs of the model are
//! ignored — downstream embedding works on plain crops.

use crate::types::FaceBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: usize = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU: f32 = 0.4;
/// Feature-map strides; the model emits one score and one offset tensor per
/// stride, in this order: scores for 8/16/32, then offsets for 8/16/32.
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download from insightface and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Mapping from letterboxed model space back to source-frame pixels.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Mapping {
    fn for_frame(width: usize, height: usize) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let content_w = width as f32 * scale;
        let content_h = height as f32 * scale;
        Self {
            scale,
            pad_x: (INPUT_SIZE as f32 - content_w) / 2.0,
            pad_y: (INPUT_SIZE as f32 - content_h) / 2.0,
        }
    }

    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// A decoded detection in source-frame coordinates, pre-suppression.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        if num_outputs < STRIDES.len() * 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and offset tensors per stride ({} total), got {num_outputs}",
                STRIDES.len() * 2
            )));
        }

        tracing::info!(
            path = model_path,
            outputs = num_outputs,
            "loaded SCRFD detector"
        );

        Ok(Self { session })
    }

    /// Detect faces in an interleaved-RGB frame.
    ///
    /// Returned boxes are in the coordinates of the frame handed in, sorted
    /// by confidence, highest first.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceBox>, DetectorError> {
        let mapping = Mapping::for_frame(width as usize, height as usize);
        let input = preprocess(rgb, width as usize, height as usize, &mapping);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in STRIDES.iter().enumerate() {
            let (_, scores) = outputs[pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, offsets) = outputs[pos + STRIDES.len()]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("offsets stride {stride}: {e}")))?;

            decode_stride(scores, offsets, stride, &mapping, &mut candidates);
        }

        let kept = suppress(candidates, NMS_IOU);
        Ok(kept
            .into_iter()
            .map(|c| FaceBox::from_corners(c.x1, c.y1, c.x2, c.y2, c.score))
            .collect())
    }
}

/// Letterbox an interleaved-RGB frame into the NCHW model tensor.
///
/// Samples the source bilinearly straight into the tensor; pixels outside
/// the content area get the mean value, which normalizes to zero.
fn preprocess(rgb: &[u8], width: usize, height: usize, mapping: &Mapping) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    if width == 0 || height == 0 {
        return tensor;
    }

    let inv_scale = 1.0 / mapping.scale;

    for ty in 0..INPUT_SIZE {
        let src_y = (ty as f32 - mapping.pad_y + 0.5) * inv_scale - 0.5;
        for tx in 0..INPUT_SIZE {
            let src_x = (tx as f32 - mapping.pad_x + 0.5) * inv_scale - 0.5;

            let inside = src_x > -1.0
                && src_x < width as f32
                && src_y > -1.0
                && src_y < height as f32;

            for c in 0..3 {
                let value = if inside {
                    sample_bilinear(rgb, width, height, src_x, src_y, c)
                } else {
                    PIXEL_MEAN
                };
                tensor[[0, c, ty, tx]] = (value - PIXEL_MEAN) / PIXEL_STD;
            }
        }
    }

    tensor
}

/// Bilinear sample of one channel from interleaved RGB, clamped at edges.
fn sample_bilinear(rgb: &[u8], width: usize, height: usize, x: f32, y: f32, channel: usize) -> f32 {
    let x0 = (x.floor() as i64).clamp(0, width as i64 - 1) as usize;
    let y0 = (y.floor() as i64).clamp(0, height as i64 - 1) as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (x - x.floor()).clamp(0.0, 1.0);
    let fy = (y - y.floor()).clamp(0.0, 1.0);

    let px = |px: usize, py: usize| rgb[(py * width + px) * 3 + channel] as f32;

    let top = px(x0, y0) * (1.0 - fx) + px(x1, y0) * fx;
    let bottom = px(x0, y1) * (1.0 - fx) + px(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Decode one stride level: offsets are distances from the anchor center to
/// the four box edges, in stride units.
fn decode_stride(
    scores: &[f32],
    offsets: &[f32],
    stride: usize,
    mapping: &Mapping,
    out: &mut Vec<Candidate>,
) {
    let grid_w = INPUT_SIZE / stride;
    let grid_h = INPUT_SIZE / stride;
    let num_anchors = grid_w * grid_h * ANCHORS_PER_CELL;

    for idx in 0..num_anchors.min(scores.len()) {
        let score = scores[idx];
        if score <= SCORE_THRESHOLD {
            continue;
        }

        let off = idx * 4;
        if off + 3 >= offsets.len() {
            break;
        }

        let cell = idx / ANCHORS_PER_CELL;
        let cx = ((cell % grid_w) * stride) as f32;
        let cy = ((cell / grid_w) * stride) as f32;

        let s = stride as f32;
        let (x1, y1) = mapping.to_frame(cx - offsets[off] * s, cy - offsets[off + 1] * s);
        let (x2, y2) = mapping.to_frame(cx + offsets[off + 2] * s, cy + offsets[off + 3] * s);

        out.push(Candidate {
            x1,
            y1,
            x2,
            y2,
            score,
        });
    }
}

/// Greedy non-maximum suppression, highest score first.
fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
