//! Gallery of known faces, loaded from a directory of labeled images.
//!
//! Filenames double as identity labels (`john_doe.jpg` → label `john_doe`).
//! The gallery is rebuilt wholesale on every load; there is no incremental
//! update path.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::types::GalleryEntry;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions scanned as gallery images.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

/// In-memory gallery: positionally-aligned labels and encodings.
#[derive(Debug, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a gallery from pre-computed entries.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scan `dir` and build one entry per image with a detectable face.
    ///
    /// A missing directory is created and yields an empty gallery — every
    /// probe then reports Unknown. Files that fail to decode, or contain no
    /// detectable face, are skipped with a warning. When an image holds
    /// several faces only the first is enrolled.
    pub fn load<A: FaceAnalyzer>(dir: &Path, analyzer: &mut A) -> Result<Self, GalleryError> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            tracing::info!(dir = %dir.display(), "created empty gallery directory");
            return Ok(Self::empty());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| has_image_extension(p))
            .collect();
        paths.sort();

        let mut entries = Vec::new();
        for path in &paths {
            let image = match decode_image(path) {
                Ok(img) => img,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable gallery image, skipping");
                    continue;
                }
            };

            let faces = analyzer.analyze(image.as_raw(), image.width(), image.height())?;
            match faces.into_iter().next() {
                Some(face) => {
                    let label = file_stem(path);
                    tracing::debug!(label = %label, "gallery entry loaded");
                    entries.push(GalleryEntry {
                        label,
                        encoding: face.encoding,
                    });
                }
                None => {
                    tracing::warn!(path = %path.display(), "no face found in gallery image, skipping");
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            files = paths.len(),
            entries = entries.len(),
            "gallery loaded"
        );

        Ok(Self { entries })
    }
}

/// Decode by sniffing content, not extension — gallery files arrive from
/// uploads and may be misnamed.
fn decode_image(path: &Path) -> Result<image::RgbImage, image::ImageError> {
    let reader = image::ImageReader::open(path)
        .map_err(image::ImageError::IoError)?
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    Ok(reader.decode()?.to_rgb8())
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectedFace, Encoding, FaceBox};
    use std::collections::VecDeque;

    /// Analyzer stub that serves a scripted result per call, in path order.
    struct ScriptedAnalyzer {
        results: VecDeque<Vec<DetectedFace>>,
    }

    impl ScriptedAnalyzer {
        fn new(results: Vec<Vec<DetectedFace>>) -> Self {
            Self {
                results: results.into(),
            }
        }
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn analyze(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<DetectedFace>, AnalyzerError> {
            Ok(self.results.pop_front().unwrap_or_default())
        }
    }

    fn face(seed: f32) -> DetectedFace {
        DetectedFace {
            bbox: FaceBox {
                top: 0,
                right: 10,
                bottom: 10,
                left: 0,
                confidence: 0.9,
            },
            encoding: Encoding::new(vec![seed, 1.0 - seed]),
        }
    }

    fn write_image(dir: &Path, name: &str) {
        let img = image::RgbImage::new(8, 8);
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn missing_directory_is_created_and_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("known_faces");
        let mut analyzer = ScriptedAnalyzer::new(vec![]);

        let gallery = Gallery::load(&dir, &mut analyzer).unwrap();
        assert!(gallery.is_empty());
        assert!(dir.is_dir());
    }

    #[test]
    fn labels_come_from_file_stems_in_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_image(tmp.path(), "alice.png");
        write_image(tmp.path(), "bob_smith.jpg");

        let mut analyzer = ScriptedAnalyzer::new(vec![vec![face(0.1)], vec![face(0.2)]]);
        let gallery = Gallery::load(tmp.path(), &mut analyzer).unwrap();

        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.entries()[0].label, "alice");
        assert_eq!(gallery.entries()[1].label, "bob_smith");
    }

    #[test]
    fn faceless_images_contribute_no_entry() {
        let tmp = tempfile::tempdir().unwrap();
        write_image(tmp.path(), "a.png");
        write_image(tmp.path(), "b.png");

        let mut analyzer = ScriptedAnalyzer::new(vec![vec![], vec![face(0.3)]]);
        let gallery = Gallery::load(tmp.path(), &mut analyzer).unwrap();

        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.entries()[0].label, "b");
    }

    #[test]
    fn first_face_wins_in_multi_face_images() {
        let tmp = tempfile::tempdir().unwrap();
        write_image(tmp.path(), "pair.png");

        let mut analyzer = ScriptedAnalyzer::new(vec![vec![face(0.4), face(0.9)]]);
        let gallery = Gallery::load(tmp.path(), &mut analyzer).unwrap();

        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.entries()[0].encoding.values[0], 0.4);
    }

    #[test]
    fn non_image_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"not an image").unwrap();
        std::fs::write(tmp.path().join("listing.pdf"), b"%PDF-").unwrap();

        let mut analyzer = ScriptedAnalyzer::new(vec![]);
        let gallery = Gallery::load(tmp.path(), &mut analyzer).unwrap();
        assert!(gallery.is_empty());
    }
}
