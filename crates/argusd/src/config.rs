use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// HTTP bind address (default: 127.0.0.1:5000).
    pub bind_addr: String,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of labeled gallery images (created on demand).
    pub gallery_dir: PathBuf,
    /// Path of the CSV event log.
    pub log_path: PathBuf,
    /// Maximum encoding distance for a positive match (lower = stricter).
    pub match_tolerance: f32,
    /// Frame shrink ratio applied before detection.
    pub downsample_ratio: f32,
    /// Minimum seconds between repeated group-alert log rows.
    pub group_cooldown_secs: u64,
    /// Timeout in seconds for an HTTP request.
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `ARGUS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("ARGUS_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5000".to_string()),
            camera_device: std::env::var("ARGUS_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir: std::env::var("ARGUS_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            gallery_dir: std::env::var("ARGUS_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("known_faces")),
            log_path: std::env::var("ARGUS_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("activity_logs.csv")),
            match_tolerance: env_f32("ARGUS_MATCH_TOLERANCE", 0.45),
            downsample_ratio: env_f32("ARGUS_DOWNSAMPLE_RATIO", 0.5),
            group_cooldown_secs: env_u64("ARGUS_GROUP_COOLDOWN_SECS", 10),
            request_timeout_secs: env_u64("ARGUS_REQUEST_TIMEOUT_SECS", 30),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the MoveNet pose model.
    pub fn pose_model_path(&self) -> String {
        self.model_dir
            .join("movenet_lightning.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
