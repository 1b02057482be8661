//! Upload ingestion: labeled images and PDF dossiers into the gallery.
//!
//! Dispatch is by lowercased file extension. Images are persisted as-is
//! (their stem is the identity label) and every detected face is cropped
//! out beside them; PDFs are rasterized page by page in memory and only the
//! face crops are kept. Anything else is rejected before touching disk.

use argus_core::{FaceAnalyzer, FaceBox};
use image::RgbImage;
use pdfium_render::prelude::*;
use std::path::Path;
use thiserror::Error;

/// Rasterization width for PDF pages; tall pages keep their aspect ratio.
const PDF_PAGE_WIDTH: i32 = 1200;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported file format: {0}")]
    UnsupportedExtension(String),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("gallery write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Analyzer(#[from] argus_core::AnalyzerError),
    #[error("pdf processing failed: {0}")]
    Pdf(String),
    #[error("empty face region")]
    EmptyRegion,
}

/// What an accepted upload produced.
#[derive(Debug)]
pub struct IngestOutcome {
    pub faces_saved: usize,
    pub message: String,
}

/// Ingest one uploaded file into the gallery directory.
pub fn ingest_upload<A: FaceAnalyzer + ?Sized>(
    filename: &str,
    bytes: &[u8],
    gallery_dir: &Path,
    analyzer: &mut A,
) -> Result<IngestOutcome, IngestError> {
    let name = basename(filename);
    let ext = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => ingest_pdf(&name, bytes, gallery_dir, analyzer),
        "jpg" | "jpeg" | "png" => ingest_image(&name, bytes, gallery_dir, analyzer),
        other => Err(IngestError::UnsupportedExtension(other.to_string())),
    }
}

/// Persist the uploaded image and crop out each detected face.
fn ingest_image<A: FaceAnalyzer + ?Sized>(
    name: &str,
    bytes: &[u8],
    gallery_dir: &Path,
    analyzer: &mut A,
) -> Result<IngestOutcome, IngestError> {
    std::fs::create_dir_all(gallery_dir)?;

    let dest = gallery_dir.join(name);
    std::fs::write(&dest, bytes)?;
    tracing::info!(path = %dest.display(), "stored gallery image");

    let image = image::load_from_memory(bytes)?.to_rgb8();
    let faces = analyzer.analyze(image.as_raw(), image.width(), image.height())?;

    if faces.is_empty() {
        tracing::warn!(name, "no face detected in uploaded image");
        return Ok(IngestOutcome {
            faces_saved: 0,
            message: format!("Image stored, but no face was detected in {name}"),
        });
    }

    let stem = stem_of(name);
    let mut saved = 0usize;
    for (i, face) in faces.iter().enumerate() {
        let crop_dest = gallery_dir.join(format!("{stem}_{i}.jpg"));
        match save_face_crop(&image, &face.bbox, &crop_dest) {
            Ok(()) => saved += 1,
            Err(e) => tracing::warn!(error = %e, index = i, "skipping unusable face region"),
        }
    }

    Ok(IngestOutcome {
        faces_saved: saved,
        message: format!("Image processed: {saved} face(s) extracted from {name}"),
    })
}

/// Rasterize every PDF page and save each detected face crop.
fn ingest_pdf<A: FaceAnalyzer + ?Sized>(
    name: &str,
    bytes: &[u8],
    gallery_dir: &Path,
    analyzer: &mut A,
) -> Result<IngestOutcome, IngestError> {
    std::fs::create_dir_all(gallery_dir)?;

    let pdfium = Pdfium::new(
        Pdfium::bind_to_system_library().map_err(|e| IngestError::Pdf(e.to_string()))?,
    );
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| IngestError::Pdf(e.to_string()))?;

    let render_config = PdfRenderConfig::new().set_target_width(PDF_PAGE_WIDTH);
    let stem = stem_of(name);
    let mut saved = 0usize;
    let mut pages = 0usize;

    for page in document.pages().iter() {
        pages += 1;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| IngestError::Pdf(e.to_string()))?;
        let image = bitmap.as_image().to_rgb8();

        let faces = analyzer.analyze(image.as_raw(), image.width(), image.height())?;
        if faces.is_empty() {
            tracing::debug!(page = pages, "no face on PDF page");
            continue;
        }

        for face in &faces {
            let crop_dest = gallery_dir.join(format!("{stem}_{saved}.jpg"));
            match save_face_crop(&image, &face.bbox, &crop_dest) {
                Ok(()) => saved += 1,
                Err(e) => tracing::warn!(error = %e, page = pages, "skipping unusable face region"),
            }
        }
    }

    tracing::info!(name, pages, faces = saved, "PDF ingested");

    Ok(IngestOutcome {
        faces_saved: saved,
        message: format!("PDF processed: {saved} face(s) extracted from {pages} page(s)"),
    })
}

/// Crop one face region out of a page/image and save it as a JPEG.
fn save_face_crop(image: &RgbImage, bbox: &FaceBox, dest: &Path) -> Result<(), IngestError> {
    let b = bbox.clamped(image.width(), image.height());
    if b.width() == 0 || b.height() == 0 {
        return Err(IngestError::EmptyRegion);
    }

    let crop = image::imageops::crop_imm(
        image,
        b.left as u32,
        b.top as u32,
        b.width() as u32,
        b.height() as u32,
    )
    .to_image();
    crop.save(dest)?;
    tracing::info!(path = %dest.display(), "saved face crop");
    Ok(())
}

/// Strip any client-supplied directory components.
fn basename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload")
        .to_string()
}

fn stem_of(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{
        AnalyzerError, DetectedFace, Encoding, Gallery, Matcher, NearestMatcher,
        UNKNOWN_IDENTITY,
    };
    use std::io::Cursor;

    /// Analyzer stub that reports one fixed face per call.
    struct OneFace {
        encoding: Vec<f32>,
    }

    impl FaceAnalyzer for OneFace {
        fn analyze(
            &mut self,
            _rgb: &[u8],
            width: u32,
            height: u32,
        ) -> Result<Vec<DetectedFace>, AnalyzerError> {
            Ok(vec![DetectedFace {
                bbox: FaceBox {
                    top: 0,
                    right: (width / 2) as i64,
                    bottom: (height / 2) as i64,
                    left: 0,
                    confidence: 0.9,
                },
                encoding: Encoding::new(self.encoding.clone()),
            }])
        }
    }

    struct NoFace;

    impl FaceAnalyzer for NoFace {
        fn analyze(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<DetectedFace>, AnalyzerError> {
            Ok(vec![])
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::new(16, 16);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn unsupported_extension_has_no_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let gallery_dir = tmp.path().join("known_faces");

        let result = ingest_upload("notes.txt", b"hello", &gallery_dir, &mut NoFace);
        assert!(matches!(result, Err(IngestError::UnsupportedExtension(_))));
        assert!(!gallery_dir.exists());
    }

    #[test]
    fn image_upload_persists_original_and_crop() {
        let tmp = tempfile::tempdir().unwrap();
        let gallery_dir = tmp.path().join("known_faces");

        let mut analyzer = OneFace {
            encoding: vec![1.0, 0.0],
        };
        let outcome =
            ingest_upload("alice.png", &png_bytes(), &gallery_dir, &mut analyzer).unwrap();

        assert_eq!(outcome.faces_saved, 1);
        assert!(gallery_dir.join("alice.png").is_file());
        assert!(gallery_dir.join("alice_0.jpg").is_file());
    }

    #[test]
    fn faceless_image_is_stored_with_warning_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let gallery_dir = tmp.path().join("known_faces");

        let outcome = ingest_upload("empty.png", &png_bytes(), &gallery_dir, &mut NoFace).unwrap();
        assert_eq!(outcome.faces_saved, 0);
        assert!(gallery_dir.join("empty.png").is_file());
        // The original is kept, but nothing else appears.
        assert_eq!(std::fs::read_dir(&gallery_dir).unwrap().count(), 1);
    }

    #[test]
    fn path_components_are_stripped_from_upload_names() {
        let tmp = tempfile::tempdir().unwrap();
        let gallery_dir = tmp.path().join("known_faces");

        let mut analyzer = OneFace {
            encoding: vec![1.0, 0.0],
        };
        ingest_upload("../../etc/alice.png", &png_bytes(), &gallery_dir, &mut analyzer).unwrap();
        assert!(gallery_dir.join("alice.png").is_file());
        assert!(!tmp.path().join("etc").exists());
    }

    #[test]
    fn uppercase_extension_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let gallery_dir = tmp.path().join("known_faces");

        let mut analyzer = OneFace {
            encoding: vec![1.0, 0.0],
        };
        let outcome =
            ingest_upload("ALICE.PNG", &png_bytes(), &gallery_dir, &mut analyzer).unwrap();
        assert_eq!(outcome.faces_saved, 1);
    }

    #[test]
    fn uploaded_identity_then_matches_a_near_probe() {
        // End-to-end: ingest alice.jpg, reload the gallery, probe near and far.
        let tmp = tempfile::tempdir().unwrap();
        let gallery_dir = tmp.path().join("known_faces");

        let mut analyzer = OneFace {
            encoding: vec![1.0, 0.0],
        };
        ingest_upload("alice.jpg", &png_bytes(), &gallery_dir, &mut analyzer).unwrap();

        let gallery = Gallery::load(&gallery_dir, &mut analyzer).unwrap();
        assert!(gallery.entries().iter().any(|e| e.label == "alice"));

        let near = NearestMatcher.best_match(
            &Encoding::new(vec![0.99, 0.01]),
            gallery.entries(),
            0.45,
        );
        assert!(near.is_criminal);
        assert_eq!(near.identity, "alice");

        let far = NearestMatcher.best_match(
            &Encoding::new(vec![-1.0, 0.0]),
            gallery.entries(),
            0.45,
        );
        assert!(!far.is_criminal);
        assert_eq!(far.identity, UNKNOWN_IDENTITY);
    }
}
