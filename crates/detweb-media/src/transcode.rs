//! Transcoder capability: intermediate encode -> browser-compatible H.264.
//!
//! Exposed as a trait so tests can substitute a fake without invoking an
//! external binary.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Default subprocess timeout. Bounds worst-case request latency; the
/// original design had none.
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 600;

/// Converts an intermediate-codec video into a browser-playable one.
///
/// Single invocation, pass/fail outcome. No partial-output guarantee on
/// failure.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// FFmpeg-based transcoder: H.264, fast preset, CRF 23, metadata relocated
/// for progressive playback.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    crf: u8,
    preset: String,
    timeout_secs: u64,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            crf: 23,
            preset: "fast".to_string(),
            timeout_secs: DEFAULT_TRANSCODE_TIMEOUT_SECS,
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()> {
        info!(
            input = %input.display(),
            output = %output.display(),
            "Re-encoding video for web compatibility"
        );

        let cmd = FfmpegCommand::new(input, output)
            .video_codec("libx264")
            .preset(&self.preset)
            .crf(self.crf)
            .faststart();

        let runner = FfmpegRunner::new().with_timeout(self.timeout_secs);
        runner.run(&cmd).await?;

        info!(output = %output.display(), "Transcode complete");
        Ok(())
    }
}
