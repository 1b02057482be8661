//! Feed loop engine.
//!
//! A single background OS thread pulls frames from the camera, detects and
//! matches faces against the gallery, classifies each person's activity
//! from their pose, appends log rows, and publishes an annotated JPEG
//! snapshot. Resources (camera, models, gallery) are opened fail-fast when
//! the loop starts; the gallery is re-read on every start so newly ingested
//! faces take effect.

use crate::config::Config;
use crate::eventlog::{EventLog, LogError};
use argus_core::roi::pose_roi;
use argus_core::{
    classify, Activity, AnalyzerError, FaceAnalyzer, FaceBox, Gallery, GalleryError, MatchOutcome,
    Matcher, MoveNetEstimator, NearestMatcher, OnnxFaceAnalyzer, PoseEstimator,
};
use argus_hw::{crop_region, downsample, Camera, CameraError, Frame, VideoSource};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Criminal matches in one frame needed to flag a group.
const GROUP_MIN_CRIMINALS: usize = 2;
const BOX_THICKNESS: i64 = 2;
const BANNER_HEIGHT: u32 = 24;
const SNAPSHOT_JPEG_QUALITY: u8 = 80;
/// Synthetic identity used for group-alert rows.
const GROUP_IDENTITY: &str = "group";

const COLOR_CRIMINAL: Rgb<u8> = Rgb([255, 0, 0]);
const COLOR_CLEAR: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error("pose model: {0}")]
    Pose(#[from] argus_core::pose::PoseError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("frame buffer does not match its dimensions")]
    MalformedFrame,
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] image::ImageError),
}

/// Cooldown gate for repeated group-alert rows.
///
/// Owned by the loop and re-seeded at start; `observe` reports whether this
/// sighting should produce a log row. Only the row is gated: the banner is
/// drawn on every flagged frame.
pub struct GroupAlert {
    cooldown: Duration,
    last_alert: Option<Instant>,
}

impl GroupAlert {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: None,
        }
    }

    pub fn observe(&mut self, criminal_count: usize, now: Instant) -> bool {
        if criminal_count < GROUP_MIN_CRIMINALS {
            return false;
        }
        match self.last_alert {
            Some(last) if now.duration_since(last) < self.cooldown => false,
            _ => {
                self.last_alert = Some(now);
                true
            }
        }
    }
}

/// Shared handle between the HTTP layer and the loop thread.
///
/// Holds the single-instance running flag and the latest annotated frame.
#[derive(Default)]
pub struct FeedController {
    running: AtomicBool,
    snapshot: Mutex<Option<Vec<u8>>>,
}

impl FeedController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest annotated frame as JPEG, if the loop has published one.
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }

    fn publish_snapshot(&self, jpeg: Vec<u8>) {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = Some(jpeg);
        }
    }

    fn try_acquire(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Result of a start request.
#[derive(Debug, PartialEq, Eq)]
pub enum FeedStart {
    Started,
    AlreadyRunning,
}

/// Spawn the feed loop on a dedicated OS thread.
///
/// Returns immediately; loop-internal failures (camera missing, model
/// missing) are logged server-side, never reported to the caller that
/// started the feed.
pub fn spawn_feed(
    controller: Arc<FeedController>,
    config: Arc<Config>,
    log: EventLog,
) -> FeedStart {
    if !controller.try_acquire() {
        return FeedStart::AlreadyRunning;
    }

    std::thread::Builder::new()
        .name("argus-feed".into())
        .spawn(move || {
            tracing::info!("feed thread started");
            if let Err(e) = run_feed(&controller, &config, &log) {
                tracing::error!(error = %e, "feed loop failed");
            }
            controller.release();
            tracing::info!("feed thread exited");
        })
        .expect("failed to spawn feed thread");

    FeedStart::Started
}

/// Open every resource fail-fast, then hand off to the loop.
fn run_feed(
    controller: &FeedController,
    config: &Config,
    log: &EventLog,
) -> Result<(), EngineError> {
    let mut analyzer = OnnxFaceAnalyzer::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )?;
    let mut pose = MoveNetEstimator::load(&config.pose_model_path())?;

    let gallery = Gallery::load(&config.gallery_dir, &mut analyzer)?;
    tracing::info!(entries = gallery.len(), "gallery seeded for feed");

    let camera = Camera::open(&config.camera_device)?;
    let mut stream = camera.stream()?;

    let mut group_alert = GroupAlert::new(Duration::from_secs(config.group_cooldown_secs));

    run_loop(
        controller,
        &mut stream,
        &mut analyzer,
        &mut pose,
        &gallery,
        log,
        &mut group_alert,
        config.match_tolerance,
        config.downsample_ratio,
    )
}

/// The loop proper, generic over its seams so it can run against stub
/// sources and models in tests.
#[allow(clippy::too_many_arguments)]
pub fn run_loop<S, A, P>(
    controller: &FeedController,
    source: &mut S,
    analyzer: &mut A,
    pose: &mut P,
    gallery: &Gallery,
    log: &EventLog,
    group_alert: &mut GroupAlert,
    tolerance: f32,
    downsample_ratio: f32,
) -> Result<(), EngineError>
where
    S: VideoSource,
    A: FaceAnalyzer,
    P: PoseEstimator,
{
    tracing::info!("feed loop running");

    // End of stream (or a failed read) ends the loop gracefully.
    while let Some(frame) = source.next_frame() {
        match process_frame(
            frame,
            analyzer,
            pose,
            gallery,
            log,
            group_alert,
            tolerance,
            downsample_ratio,
        ) {
            Ok(jpeg) => controller.publish_snapshot(jpeg),
            // One bad frame never ends the feed.
            Err(e) => tracing::warn!(error = %e, "frame processing failed, skipping"),
        }
    }

    tracing::info!("feed stream ended");
    Ok(())
}

/// Everything the loop learned about one face this frame.
struct FaceReport {
    bbox: FaceBox,
    outcome: MatchOutcome,
    activity: Activity,
}

/// One full iteration: detect, match, classify, log, annotate.
#[allow(clippy::too_many_arguments)]
fn process_frame<A, P>(
    frame: Frame,
    analyzer: &mut A,
    pose: &mut P,
    gallery: &Gallery,
    log: &EventLog,
    group_alert: &mut GroupAlert,
    tolerance: f32,
    downsample_ratio: f32,
) -> Result<Vec<u8>, EngineError>
where
    A: FaceAnalyzer,
    P: PoseEstimator,
{
    let faces = detect_rescaled(&frame, analyzer, downsample_ratio)?;
    let reports = assess_faces(&frame, faces, gallery, pose, tolerance);

    for report in &reports {
        log.append(
            &report.outcome.identity,
            &report.activity.to_string(),
            report.outcome.is_criminal,
        )?;
    }

    let criminal_count = reports.iter().filter(|r| r.outcome.is_criminal).count();
    let group_flagged = criminal_count >= GROUP_MIN_CRIMINALS;
    if group_alert.observe(criminal_count, Instant::now()) {
        tracing::warn!(criminal_count, "group of criminals detected");
        log.append(
            GROUP_IDENTITY,
            &format!("Group detected ({criminal_count} criminals)"),
            true,
        )?;
    }

    render(frame, &reports, group_flagged)
}

/// Detect on the downsampled frame and map the boxes back to full-frame
/// coordinates with the inverse ratio.
fn detect_rescaled<A: FaceAnalyzer>(
    frame: &Frame,
    analyzer: &mut A,
    downsample_ratio: f32,
) -> Result<Vec<argus_core::DetectedFace>, EngineError> {
    let small = downsample(frame, downsample_ratio);
    let detected = analyzer.analyze(&small.data, small.width, small.height)?;

    let inverse = 1.0 / downsample_ratio;
    Ok(detected
        .into_iter()
        .map(|face| argus_core::DetectedFace {
            bbox: face.bbox.scaled(inverse).clamped(frame.width, frame.height),
            encoding: face.encoding,
        })
        .collect())
}

/// Match and classify every detected face. Pose failures degrade to Idle.
fn assess_faces<P: PoseEstimator>(
    frame: &Frame,
    faces: Vec<argus_core::DetectedFace>,
    gallery: &Gallery,
    pose: &mut P,
    tolerance: f32,
) -> Vec<FaceReport> {
    let matcher = NearestMatcher;

    faces
        .into_iter()
        .map(|face| {
            let outcome = matcher.best_match(&face.encoding, gallery.entries(), tolerance);
            let activity = classify_in_roi(frame, &face.bbox, pose);
            tracing::debug!(
                identity = %outcome.identity,
                criminal = outcome.is_criminal,
                activity = %activity,
                "face assessed"
            );
            FaceReport {
                bbox: face.bbox,
                outcome,
                activity,
            }
        })
        .collect()
}

/// Run pose estimation on the padded region around a face and classify.
fn classify_in_roi<P: PoseEstimator>(frame: &Frame, bbox: &FaceBox, pose: &mut P) -> Activity {
    let roi = pose_roi(bbox, frame.width, frame.height);
    if roi.is_empty() {
        return Activity::Idle;
    }

    let (crop, crop_w, crop_h) = crop_region(
        &frame.data,
        frame.width,
        frame.height,
        roi.left,
        roi.top,
        roi.right,
        roi.bottom,
    );

    match pose.estimate(&crop, crop_w, crop_h) {
        Ok(Some(landmarks)) => classify(&landmarks),
        Ok(None) => Activity::Idle,
        Err(e) => {
            tracing::warn!(error = %e, "pose estimation failed, defaulting to Idle");
            Activity::Idle
        }
    }
}

/// Draw boxes (red criminal, green otherwise) and the group banner, then
/// encode the frame as JPEG.
fn render(frame: Frame, reports: &[FaceReport], group_flagged: bool) -> Result<Vec<u8>, EngineError> {
    let (width, height) = (frame.width, frame.height);
    let mut canvas =
        RgbImage::from_raw(width, height, frame.data).ok_or(EngineError::MalformedFrame)?;

    for report in reports {
        let color = if report.outcome.is_criminal {
            COLOR_CRIMINAL
        } else {
            COLOR_CLEAR
        };
        draw_box(&mut canvas, &report.bbox.clamped(width, height), color);
    }

    if group_flagged {
        let banner_h = BANNER_HEIGHT.min(height);
        if banner_h > 0 {
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(0, 0).of_size(width, banner_h),
                COLOR_CRIMINAL,
            );
        }
    }

    let mut jpeg = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, SNAPSHOT_JPEG_QUALITY);
    canvas.write_with_encoder(encoder)?;
    Ok(jpeg)
}

fn draw_box(canvas: &mut RgbImage, bbox: &FaceBox, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let w = bbox.width() - 2 * inset;
        let h = bbox.height() - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at((bbox.left + inset) as i32, (bbox.top + inset) as i32)
            .of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
