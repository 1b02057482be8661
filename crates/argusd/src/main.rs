use anyhow::{Context, Result};
use argusd::config::Config;
use argusd::engine::FeedController;
use argusd::eventlog::EventLog;
use argusd::routes::build_router;
use argusd::state::AppState;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("argusd starting");

    let config = Arc::new(Config::from_env());

    // The ingestion path needs the face models up front; fail fast if they
    // are missing rather than on the first upload.
    let analyzer = argus_core::OnnxFaceAnalyzer::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )
    .context("loading face models")?;

    let state = AppState {
        config: config.clone(),
        controller: Arc::new(FeedController::new()),
        log: EventLog::new(config.log_path.clone()),
        analyzer: Arc::new(Mutex::new(analyzer)),
    };

    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "argusd ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("argusd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
