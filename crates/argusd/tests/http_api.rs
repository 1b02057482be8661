//! HTTP-level integration tests for the daemon routes.
//!
//! Uses axum's `tower::ServiceExt` to send requests directly to the router,
//! with a stub analyzer so no ONNX models are needed.

use argus_core::{AnalyzerError, DetectedFace, Encoding, FaceAnalyzer, FaceBox};
use argusd::config::Config;
use argusd::engine::FeedController;
use argusd::eventlog::EventLog;
use argusd::routes::build_router;
use argusd::state::AppState;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Stub analyzer: one face in the top-left quadrant of any image.
struct OneFace;

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
                right: (width / 2).max(1) as i64,
                bottom: (height / 2).max(1) as i64,
                left: 0,
                confidence: 0.9,
            },
            encoding: Encoding::new(vec![1.0, 0.0]),
        }])
    }
}

fn test_config(dir: &Path) -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        camera_device: "/dev/video-none".to_string(),
        model_dir: dir.join("models"),
        gallery_dir: dir.join("known_faces"),
        log_path: dir.join("activity_logs.csv"),
        match_tolerance: 0.45,
        downsample_ratio: 0.5,
        group_cooldown_secs: 10,
        request_timeout_secs: 5,
    }
}

fn build_test_app(dir: &Path) -> (Router, EventLog) {
    let config = Arc::new(test_config(dir));
    let log = EventLog::new(config.log_path.clone());
    let state = AppState {
        config: config.clone(),
        controller: Arc::new(FeedController::new()),
        log: log.clone(),
        analyzer: Arc::new(Mutex::new(OneFace)),
    };
    (build_router(state, &config), log)
}

async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_upload(filename: &str, content: &[u8]) -> Request<Body> {
    let boundary = "ARGUS-TEST-BOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload_file")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::new(16, 16);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn healthz_reports_ok_and_idle_feed() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _log) = build_test_app(tmp.path());

    let response = get(app, "/healthz").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["feed_running"], false);
}

#[tokio::test]
async fn get_logs_is_empty_before_any_event() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _log) = build_test_app(tmp.path());

    let response = get(app, "/get_logs").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn get_logs_returns_rows_in_append_order() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, log) = build_test_app(tmp.path());

    log.append("alice", "Idle", true).unwrap();
    log.append("Unknown", "Both hands up", false).unwrap();

    let response = get(app, "/get_logs").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["identity"], "alice");
    assert_eq!(rows[0]["role"], "CRIMINAL");
    assert_eq!(rows[1]["identity"], "Unknown");
    assert_eq!(rows[1]["activity"], "Both hands up");
}

#[tokio::test]
async fn upload_rejects_unsupported_extension() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _log) = build_test_app(tmp.path());

    let response = app
        .oneshot(multipart_upload("report.docx", b"not an image"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["status"], "fail");
    // No partial side effects.
    assert!(!tmp.path().join("known_faces").exists());
}

#[tokio::test]
async fn upload_image_persists_gallery_files() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _log) = build_test_app(tmp.path());

    let response = app
        .oneshot(multipart_upload("alice.png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "success");

    let gallery = tmp.path().join("known_faces");
    assert!(gallery.join("alice.png").is_file());
    assert!(gallery.join("alice_0.jpg").is_file());
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _log) = build_test_app(tmp.path());

    let boundary = "ARGUS-TEST-BOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload_file")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn snapshot_is_not_found_until_published() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _log) = build_test_app(tmp.path());

    let response = get(app, "/snapshot").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
