//! HTTP surface of the daemon.
//!
//! Routes:
//!
//! ```text
//! POST /upload_file   multipart field `file` → gallery ingestion
//! GET  /start_feed    spawn the feed loop, return immediately
//! GET  /get_logs      full event log as JSON rows
//! GET  /snapshot      latest annotated frame as image/jpeg
//! GET  /healthz       liveness probe
//! ```

use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::Config;
use crate::engine::{spawn_feed, FeedStart};
use crate::error::{ApiError, ApiResult};
use crate::eventlog::LogEvent;
use crate::ingest::ingest_upload;
use crate::state::AppState;

/// Standard `{status, message}` response body.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
}

/// Build the application [`Router`] with all middleware layers.
///
/// The middleware stack is applied bottom-up: CORS, request tracing,
/// timeout, then panic recovery outermost.
pub fn build_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/upload_file", post(upload_file))
        .route("/start_feed", get(start_feed))
        .route("/get_logs", get(get_logs))
        .route("/snapshot", get(snapshot))
        .route("/healthz", get(healthz))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /upload_file — accept one multipart `file` field and ingest it.
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<StatusResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        tracing::info!(filename = %filename, size = bytes.len(), "upload received");

        // Inference is CPU-bound; keep it off the async workers.
        let analyzer = state.analyzer.clone();
        let gallery_dir = state.config.gallery_dir.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut analyzer = analyzer
                .lock()
                .map_err(|_| ApiError::Internal("analyzer lock poisoned".to_string()))?;
            ingest_upload(&filename, &bytes, &gallery_dir, &mut *analyzer).map_err(ApiError::from)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("ingestion task failed: {e}")))??;

        return Ok(Json(StatusResponse {
            status: "success",
            message: outcome.message,
        }));
    }

    Err(ApiError::BadRequest(
        "missing multipart field 'file'".to_string(),
    ))
}

/// GET /start_feed — launch the feed loop and acknowledge immediately.
///
/// Loop-internal failures (camera missing, models missing) surface only in
/// server logs; this call has already returned by then.
async fn start_feed(State(state): State<AppState>) -> Json<StatusResponse> {
    match spawn_feed(
        state.controller.clone(),
        state.config.clone(),
        state.log.clone(),
    ) {
        FeedStart::Started => Json(StatusResponse {
            status: "started",
            message: "camera feed started".to_string(),
        }),
        FeedStart::AlreadyRunning => Json(StatusResponse {
            status: "already_running",
            message: "camera feed is already running".to_string(),
        }),
    }
}

/// GET /get_logs — the accumulated event rows, oldest first.
async fn get_logs(State(state): State<AppState>) -> ApiResult<Json<Vec<LogEvent>>> {
    let events = state
        .log
        .read_all()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(events))
}

/// GET /snapshot — latest annotated frame, if the loop has published one.
async fn snapshot(State(state): State<AppState>) -> ApiResult<Response> {
    match state.controller.snapshot() {
        Some(jpeg) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response()),
        None => Err(ApiError::NotFound("no frame published yet".to_string())),
    }
}

/// GET /healthz — liveness probe.
async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "feed_running": state.controller.is_running(),
    }))
}
