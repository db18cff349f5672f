//! Detection pipelines for the detweb service.
//!
//! This crate owns the upload-to-annotated-output core:
//! - [`detector`]: the detector capability boundary and detection types
//! - [`yolo`]: the YOLOv8 ONNX implementation of that capability
//! - [`image`]: single-pass still-image annotation
//! - [`video`]: sequential frame loop, intermediate encode, transcode
//! - [`transcode`]: the transcoder capability and its FFmpeg implementation
//! - [`command`]: FFmpeg subprocess builder/runner

pub mod command;
pub mod detector;
pub mod error;
pub mod fs_utils;
pub mod image;
pub mod transcode;
pub mod video;
pub mod yolo;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use detector::{AnnotatedFrame, Detection, Detector, COCO_CLASSES};
pub use error::{MediaError, MediaResult};
pub use image::annotate_image;
pub use transcode::{FfmpegTranscoder, Transcoder, DEFAULT_TRANSCODE_TIMEOUT_SECS};
pub use video::{
    even_dimension, process_video, run_frame_loop, AnnotatedFrames, FrameSink, FrameSource,
    VideoFileSink, VideoFileSource, VideoOutcome, FALLBACK_FPS,
};
pub use yolo::{YoloConfig, YoloDetector};
