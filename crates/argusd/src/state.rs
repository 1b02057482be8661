use crate::config::Config;
use crate::engine::FeedController;
use crate::eventlog::EventLog;
use argus_core::FaceAnalyzer;
use std::sync::{Arc, Mutex};

/// Shared application state available to all axum handlers via
/// `State<AppState>`. Cheaply cloneable — everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Feed-loop handle: running flag and latest annotated frame.
    pub controller: Arc<FeedController>,
    /// CSV event log (the loop appends; handlers read).
    pub log: EventLog,
    /// Analyzer used by the ingestion path. The feed loop owns a separate
    /// instance, so uploads never contend with live detection.
    pub analyzer: Arc<Mutex<dyn FaceAnalyzer + Send>>,
}
