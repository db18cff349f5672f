//! API configuration.

use std::path::PathBuf;

use detweb_media::DEFAULT_TRANSCODE_TIMEOUT_SECS;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory uploads and results are stored in
    pub output_dir: PathBuf,
    /// Path to the YOLOv8 ONNX model
    pub model_path: String,
    /// Max request body size
    pub max_body_size: usize,
    /// Transcode subprocess timeout
    pub transcode_timeout_secs: u64,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            output_dir: PathBuf::from("static/outputs"),
            model_path: "models/yolov8n.onnx".to_string(),
            max_body_size: 200 * 1024 * 1024, // 200MB
            transcode_timeout_secs: DEFAULT_TRANSCODE_TIMEOUT_SECS,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            model_path: std::env::var("MODEL_PATH").unwrap_or(defaults.model_path),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            transcode_timeout_secs: std::env::var("TRANSCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.transcode_timeout_secs),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
