//! Application state.

use std::sync::Arc;

use detweb_media::{
    Detector, FfmpegTranscoder, MediaResult, Transcoder, YoloConfig, YoloDetector,
};

use crate::config::ApiConfig;

/// Shared application state.
///
/// The detector and transcoder are process-wide, read-only capability
/// handles created once at start-up and injected into every request.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub detector: Arc<dyn Detector>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl AppState {
    /// Create application state with the real detector and transcoder.
    pub fn new(config: ApiConfig) -> MediaResult<Self> {
        let detector = YoloDetector::new(YoloConfig {
            model_path: config.model_path.clone(),
            ..Default::default()
        })?;
        let transcoder = FfmpegTranscoder::new().with_timeout(config.transcode_timeout_secs);

        Ok(Self {
            config,
            detector: Arc::new(detector),
            transcoder: Arc::new(transcoder),
        })
    }

    /// Create state with substituted capabilities (used by tests).
    pub fn with_capabilities(
        config: ApiConfig,
        detector: Arc<dyn Detector>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            config,
            detector,
            transcoder,
        }
    }
}
