//! Video pipeline: sequential decode, per-frame detection, intermediate
//! encode, then transcode to a browser-compatible format.
//!
//! The frame loop is modeled as a lazy, finite iterator over annotated
//! frames ([`AnnotatedFrames`]), consumed in strict decode order by
//! [`run_frame_loop`]. Per-frame failure policy is fail-fast: the iterator
//! fuses after the first decode or detect error and the whole run aborts.
//!
//! State sequence: open source -> open sink (failure here is fatal, before
//! any decode) -> decode/annotate/write loop -> finish sink -> transcode ->
//! cleanup on success, rename fallback on transcode failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use opencv::core::{Mat, Rect, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use tracing::{info, warn};

use crate::detector::{AnnotatedFrame, Detector};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::transcode::Transcoder;

/// Frame rate used when the source reports zero or nonsense.
pub const FALLBACK_FPS: f64 = 24.0;

/// Normalize a dimension to an even value, as required by the intermediate
/// codec. Odd dimensions lose one pixel.
pub fn even_dimension(n: i32) -> i32 {
    if n % 2 == 0 {
        n
    } else {
        n - 1
    }
}

/// Sequential producer of decoded frames.
pub trait FrameSource {
    /// Reported source dimensions (width, height).
    fn dimensions(&self) -> (i32, i32);

    /// Reported frame rate, already normalized to a usable value.
    fn fps(&self) -> f64;

    /// Decode the next frame. `Ok(None)` is normal end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<Mat>>;
}

/// Sequential consumer of annotated frames.
pub trait FrameSink {
    /// Write one frame, in decode order.
    fn write(&mut self, frame: &Mat) -> MediaResult<()>;

    /// Flush buffered writes; the file is complete only after this returns.
    fn finish(&mut self) -> MediaResult<()>;
}

/// Frame source backed by an OpenCV `VideoCapture`.
pub struct VideoFileSource {
    cap: VideoCapture,
    width: i32,
    height: i32,
    fps: f64,
}

impl VideoFileSource {
    /// Open a video file for sequential decode.
    pub fn open(path: &Path) -> MediaResult<Self> {
        let cap = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            return Err(MediaError::InvalidVideo(format!(
                "Failed to open video file: {}",
                path.display()
            )));
        }

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        let mut fps = cap.get(videoio::CAP_PROP_FPS)?;
        if !fps.is_finite() || fps <= 0.0 {
            warn!(path = %path.display(), "Source reports no frame rate, using fallback");
            fps = FALLBACK_FPS;
        }

        Ok(Self {
            cap,
            width,
            height,
            fps,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn dimensions(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> MediaResult<Option<Mat>> {
        let mut frame = Mat::default();
        let got = self.cap.read(&mut frame)?;
        if !got || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

/// Frame sink backed by an OpenCV `VideoWriter` using the XVID intermediate
/// codec.
pub struct VideoFileSink {
    writer: VideoWriter,
    width: i32,
    height: i32,
}

impl VideoFileSink {
    /// Open the destination stream at normalized even dimensions.
    ///
    /// Failure here is fatal to the pipeline run; it happens before any
    /// frame is decoded.
    pub fn create(path: &Path, fps: f64, width: i32, height: i32) -> MediaResult<Self> {
        let width = even_dimension(width);
        let height = even_dimension(height);

        let fourcc = VideoWriter::fourcc('X', 'V', 'I', 'D')?;
        let writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            fps,
            Size::new(width, height),
            true,
        )?;
        if !writer.is_opened()? {
            return Err(MediaError::SinkOpen(path.to_path_buf()));
        }

        Ok(Self {
            writer,
            width,
            height,
        })
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Mat) -> MediaResult<()> {
        // Odd-dimension sources lose one pixel row/column to match the
        // normalized sink size.
        if frame.cols() != self.width || frame.rows() != self.height {
            let roi = Mat::roi(frame, Rect::new(0, 0, self.width, self.height))?.try_clone()?;
            self.writer.write(&roi)?;
        } else {
            self.writer.write(frame)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        // release() flushes buffered writes and finalizes the container
        self.writer.release()?;
        Ok(())
    }
}

/// Lazy, finite, fused iterator of annotated frames.
///
/// Pulls one frame from the source per step and runs the detector on it.
/// After end of stream or the first error, it yields nothing further.
pub struct AnnotatedFrames<'a, S: FrameSource> {
    source: S,
    detector: &'a dyn Detector,
    done: bool,
}

impl<'a, S: FrameSource> AnnotatedFrames<'a, S> {
    pub fn new(source: S, detector: &'a dyn Detector) -> Self {
        Self {
            source,
            detector,
            done: false,
        }
    }
}

impl<S: FrameSource> Iterator for AnnotatedFrames<'_, S> {
    type Item = MediaResult<AnnotatedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        match self.detector.detect(&frame) {
            Ok(annotated) => Some(Ok(annotated)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Drive the decode -> annotate -> write loop to completion.
///
/// Frames are written in strict decode order, one write per decoded frame:
/// no drops, no duplicates, no reordering. Returns the number of frames
/// written.
pub fn run_frame_loop<S: FrameSource, K: FrameSink>(
    source: S,
    detector: &dyn Detector,
    sink: &mut K,
) -> MediaResult<u64> {
    let mut frames_written = 0u64;

    for result in AnnotatedFrames::new(source, detector) {
        let annotated = result?;
        sink.write(&annotated.frame)?;
        frames_written += 1;
    }

    sink.finish()?;
    Ok(frames_written)
}

/// Result of a completed video pipeline run.
#[derive(Debug, Clone)]
pub struct VideoOutcome {
    /// Frames decoded, annotated and written.
    pub frames: u64,
    /// Normalized output dimensions.
    pub width: i32,
    pub height: i32,
    /// Frame rate of the output.
    pub fps: f64,
    /// Whether the final artifact is the transcoded file (`true`) or the
    /// intermediate encoding kept after a transcode failure (`false`).
    pub transcoded: bool,
}

/// Decode, annotate and write every frame of `input` into `intermediate`.
///
/// Blocking; callers on the async runtime should wrap this in
/// `spawn_blocking` (as [`process_video`] does). A partial intermediate
/// file is removed when the loop aborts mid-video.
pub fn annotate_video(
    detector: &dyn Detector,
    input: &Path,
    intermediate: &Path,
) -> MediaResult<(u64, i32, i32, f64)> {
    let source = VideoFileSource::open(input)?;
    let (width, height) = source.dimensions();
    let fps = source.fps();
    let (out_w, out_h) = (even_dimension(width), even_dimension(height));

    info!(
        input = %input.display(),
        width,
        height,
        fps,
        "Opening intermediate stream at {}x{}",
        out_w,
        out_h
    );

    let mut sink = VideoFileSink::create(intermediate, fps, out_w, out_h)?;

    match run_frame_loop(source, detector, &mut sink) {
        Ok(frames) => {
            info!(frames, intermediate = %intermediate.display(), "Annotation pass complete");
            Ok((frames, out_w, out_h, fps))
        }
        Err(e) => {
            let _ = std::fs::remove_file(intermediate);
            Err(e)
        }
    }
}

/// Run the full video pipeline: annotate into an intermediate file, then
/// transcode it to `output`.
///
/// If transcoding succeeds the intermediate file is removed (removal
/// failure is logged, never surfaced). If transcoding fails the
/// intermediate file is moved to `output`, so the caller always finds a
/// playable artifact at the final path once annotation has succeeded.
pub async fn process_video(
    detector: Arc<dyn Detector>,
    transcoder: &dyn Transcoder,
    input: &Path,
    intermediate: &Path,
    output: &Path,
) -> MediaResult<VideoOutcome> {
    let input_path = input.to_path_buf();
    let intermediate_path: PathBuf = intermediate.to_path_buf();

    let (frames, width, height, fps) = tokio::task::spawn_blocking(move || {
        annotate_video(detector.as_ref(), &input_path, &intermediate_path)
    })
    .await
    .map_err(|e| MediaError::internal(format!("Annotation task panicked: {}", e)))??;

    let transcoded = match transcoder.transcode(intermediate, output).await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_file(intermediate).await {
                warn!(
                    intermediate = %intermediate.display(),
                    error = %e,
                    "Failed to remove intermediate file"
                );
            }
            true
        }
        Err(e) => {
            warn!(error = %e, "Transcode failed, keeping intermediate encoding");
            move_file(intermediate, output).await?;
            false
        }
    };

    info!(
        output = %output.display(),
        frames,
        transcoded,
        "Video pipeline complete"
    );

    Ok(VideoOutcome {
        frames,
        width,
        height,
        fps,
        transcoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_dimension() {
        assert_eq!(even_dimension(640), 640);
        assert_eq!(even_dimension(641), 640);
        assert_eq!(even_dimension(480), 480);
        assert_eq!(even_dimension(1), 0);
        assert_eq!(even_dimension(0), 0);
    }
}
