use serde::{Deserialize, Serialize};

/// Identity reported for probes that match nothing in the gallery.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Bounding box for a detected face in pixel coordinates.
///
/// Edges follow the (top, right, bottom, left) convention of the detection
/// pipeline. Boxes produced on a downsampled frame are mapped back to
/// full-frame coordinates with [`scaled`](Self::scaled).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
    pub confidence: f32,
}

impl FaceBox {
    /// Build a box from float corner coordinates, rounding to pixels.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            top: y1.round() as i64,
            right: x2.round() as i64,
            bottom: y2.round() as i64,
            left: x1.round() as i64,
            confidence,
        }
    }

    pub fn width(&self) -> i64 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.bottom - self.top).max(0)
    }

    /// Scale every edge by `factor`, rounding to pixels.
    ///
    /// Detection runs on a frame downsampled by ratio `r`; calling
    /// `scaled(1.0 / r)` maps the result back to full-frame coordinates.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            top: (self.top as f32 * factor).round() as i64,
            right: (self.right as f32 * factor).round() as i64,
            bottom: (self.bottom as f32 * factor).round() as i64,
            left: (self.left as f32 * factor).round() as i64,
            confidence: self.confidence,
        }
    }

    /// Clip the box to `width` × `height` frame bounds.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        Self {
            top: self.top.clamp(0, height as i64),
            right: self.right.clamp(0, width as i64),
            bottom: self.bottom.clamp(0, height as i64),
            left: self.left.clamp(0, width as i64),
            confidence: self.confidence,
        }
    }
}

/// Face embedding vector (512-dimensional, L2-normalized).
///
/// Compared by Euclidean distance: lower = more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance between two encodings.
    pub fn distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a frame: full box plus its encoding.
///
/// Ephemeral — recomputed every frame, owned by the loop iteration that
/// produced it.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: FaceBox,
    pub encoding: Encoding,
}

/// A labeled gallery encoding. One entry per gallery image with a
/// detectable face.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub encoding: Encoding,
}

/// Result of matching a probe encoding against the gallery.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    /// `"Unknown"` or the matched label with underscores mapped to spaces.
    pub identity: String,
    pub is_criminal: bool,
    /// Distance to the winning entry; absent when the gallery is empty.
    pub distance: Option<f32>,
}

impl MatchOutcome {
    pub fn unknown() -> Self {
        Self {
            identity: UNKNOWN_IDENTITY.to_string(),
            is_criminal: false,
            distance: None,
        }
    }
}

/// Strategy for comparing a probe encoding against the gallery.
pub trait Matcher {
    fn best_match(&self, probe: &Encoding, gallery: &[GalleryEntry], tolerance: f32)
        -> MatchOutcome;
}

/// Euclidean nearest-neighbour matcher.
///
/// Scans the whole gallery and keeps the global minimum distance; the probe
/// matches iff that minimum is within `tolerance`. When several entries fall
/// inside the tolerance, the closest one wins — never merely the first.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn best_match(
        &self,
        probe: &Encoding,
        gallery: &[GalleryEntry],
        tolerance: f32,
    ) -> MatchOutcome {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let dist = probe.distance(&entry.encoding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= tolerance => MatchOutcome {
                identity: gallery[idx].label.replace('_', " "),
                is_criminal: true,
                distance: Some(best_dist),
            },
            Some(_) => MatchOutcome {
                identity: UNKNOWN_IDENTITY.to_string(),
                is_criminal: false,
                distance: Some(best_dist),
            },
            None => MatchOutcome::unknown(),
        }
    }
}
