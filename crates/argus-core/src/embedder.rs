//! ArcFace face embedding via ONNX Runtime.
//!
//! Produces 512-dimensional L2-normalized embeddings from a padded square
//! crop around the detected box, resized to the 112×112 model input. The
//! pipeline encodes raw detection crops; no landmark alignment step.

use crate::types::{Encoding, FaceBox};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: usize = 112;
const PIXEL_MEAN: f32 = 127.5;
// Symmetric normalization — not the detector's 128.0.
const PIXEL_STD: f32 = 127.5;
const EMBEDDING_DIM: usize = 512;
/// Extra margin around the face box before cropping, as a fraction of the
/// longer box side.
const CROP_MARGIN: f32 = 0.25;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — download from insightface and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box is degenerate: {0}x{1}")]
    DegenerateBox(i64, i64),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based embedding extractor.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded ArcFace embedder");

        Ok(Self { session })
    }

    /// Extract an encoding for one detected face in an RGB frame.
    pub fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &FaceBox,
    ) -> Result<Encoding, EmbedderError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(EmbedderError::DegenerateBox(face.width(), face.height()));
        }

        let input = preprocess(rgb, width as usize, height as usize, face);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Encoding::new(l2_normalize(raw)))
    }
}

/// Square crop window around a face box, with margin. May extend past the
/// frame; sampling clamps to the edges.
fn crop_window(face: &FaceBox) -> (f32, f32, f32) {
    let side = face.width().max(face.height()) as f32 * (1.0 + CROP_MARGIN);
    let cx = (face.left + face.right) as f32 / 2.0;
    let cy = (face.top + face.bottom) as f32 / 2.0;
    (cx - side / 2.0, cy - side / 2.0, side)
}

/// Crop, resize to 112×112 and normalize into an NCHW tensor.
fn preprocess(rgb: &[u8], width: usize, height: usize, face: &FaceBox) -> Array4<f32> {
    let (origin_x, origin_y, side) = crop_window(face);
    let step = side / INPUT_SIZE as f32;

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    if width == 0 || height == 0 {
        return tensor;
    }

    for ty in 0..INPUT_SIZE {
        let sy = origin_y + (ty as f32 + 0.5) * step;
        let py = (sy.floor() as i64).clamp(0, height as i64 - 1) as usize;
        for tx in 0..INPUT_SIZE {
            let sx = origin_x + (tx as f32 + 0.5) * step;
            let px = (sx.floor() as i64).clamp(0, width as i64 - 1) as usize;
            let base = (py * width + px) * 3;
            for c in 0..3 {
                let value = rgb.get(base + c).copied().unwrap_or(0) as f32;
                tensor[[0, c, ty, tx]] = (value - PIXEL_MEAN) / PIXEL_STD;
            }
        }
    }

    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalized_vector_has_unit_norm() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_is_identity() {
        let normalized = l2_normalize(&[0.0, 0.0, 0.0]);
        assert_eq!(normalized, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn crop_window_is_square_with_margin() {
        let face = FaceBox {
            top: 100,
            right: 180,
            bottom: 220,
            left: 100,
            confidence: 0.9,
        };
        // 80 wide, 120 tall — side is the longer edge plus margin.
        let (x, y, side) = crop_window(&face);
        assert!((side - 150.0).abs() < 1e-3);
        assert!((x - (140.0 - 75.0)).abs() < 1e-3);
        assert!((y - (160.0 - 75.0)).abs() < 1e-3);
    }

    #[test]
    fn preprocess_uniform_crop_is_flat() {
        let w = 200usize;
        let h = 200usize;
        let rgb = vec![200u8; w * h * 3];
        let face = FaceBox {
            top: 50,
            right: 150,
            bottom: 150,
            left: 50,
            confidence: 1.0,
        };
        let tensor = preprocess(&rgb, w, h, &face);
        let expected = (200.0 - PIXEL_MEAN) / PIXEL_STD;
        assert!(tensor.iter().all(|v| (v - expected).abs() < 1e-4));
    }
}
