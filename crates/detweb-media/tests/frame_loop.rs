//! Frame loop semantics: order preservation, frame accounting, fail-fast.

use std::sync::atomic::{AtomicUsize, Ordering};

use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
use opencv::prelude::*;

use detweb_media::detector::{AnnotatedFrame, Detector};
use detweb_media::error::{MediaError, MediaResult};
use detweb_media::video::{run_frame_loop, AnnotatedFrames, FrameSink, FrameSource};

/// Frame with a recognizable first-pixel value.
fn marked_frame(mark: u8) -> Mat {
    Mat::new_rows_cols_with_default(8, 8, CV_8UC3, Scalar::all(mark as f64)).unwrap()
}

fn first_pixel(frame: &Mat) -> u8 {
    frame.at_2d::<Vec3b>(0, 0).unwrap()[0]
}

/// In-memory source yielding pre-built frames, optionally failing at an index.
struct VecSource {
    frames: Vec<Mat>,
    idx: usize,
    fail_at: Option<usize>,
}

impl VecSource {
    fn new(marks: &[u8]) -> Self {
        Self {
            frames: marks.iter().map(|&m| marked_frame(m)).collect(),
            idx: 0,
            fail_at: None,
        }
    }

    fn failing_at(marks: &[u8], fail_at: usize) -> Self {
        let mut source = Self::new(marks);
        source.fail_at = Some(fail_at);
        source
    }
}

impl FrameSource for VecSource {
    fn dimensions(&self) -> (i32, i32) {
        (8, 8)
    }

    fn fps(&self) -> f64 {
        24.0
    }

    fn next_frame(&mut self) -> MediaResult<Option<Mat>> {
        if self.fail_at == Some(self.idx) {
            return Err(MediaError::InvalidVideo("decode error".to_string()));
        }
        if self.idx >= self.frames.len() {
            return Ok(None);
        }
        let frame = self.frames[self.idx].try_clone()?;
        self.idx += 1;
        Ok(Some(frame))
    }
}

/// Sink recording first-pixel marks of every written frame.
#[derive(Default)]
struct VecSink {
    written: Vec<u8>,
    finished: bool,
}

impl FrameSink for VecSink {
    fn write(&mut self, frame: &Mat) -> MediaResult<()> {
        self.written.push(first_pixel(frame));
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// Pass-through detector counting invocations.
#[derive(Default)]
struct CountingDetector {
    calls: AtomicUsize,
    fail_at: Option<usize>,
}

impl CountingDetector {
    fn failing_at(fail_at: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_at: Some(fail_at),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for CountingDetector {
    fn detect(&self, frame: &Mat) -> MediaResult<AnnotatedFrame> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(call) {
            return Err(MediaError::DetectionFailed("model rejected frame".to_string()));
        }
        Ok(AnnotatedFrame {
            frame: frame.try_clone()?,
            detections: Vec::new(),
        })
    }
}

#[test]
fn writes_every_decoded_frame_in_order() {
    let marks = [3u8, 1, 4, 1, 5, 9, 2, 6, 5, 3];
    let source = VecSource::new(&marks);
    let detector = CountingDetector::default();
    let mut sink = VecSink::default();

    let frames = run_frame_loop(source, &detector, &mut sink).unwrap();

    assert_eq!(frames, 10);
    assert_eq!(detector.calls(), 10);
    assert_eq!(sink.written, marks.to_vec());
    assert!(sink.finished);
}

#[test]
fn empty_source_is_normal_termination() {
    let source = VecSource::new(&[]);
    let detector = CountingDetector::default();
    let mut sink = VecSink::default();

    let frames = run_frame_loop(source, &detector, &mut sink).unwrap();

    assert_eq!(frames, 0);
    assert!(sink.finished);
}

#[test]
fn detect_failure_aborts_run() {
    let source = VecSource::new(&[1, 2, 3, 4, 5]);
    let detector = CountingDetector::failing_at(2);
    let mut sink = VecSink::default();

    let err = run_frame_loop(source, &detector, &mut sink).unwrap_err();

    assert!(matches!(err, MediaError::DetectionFailed(_)));
    assert_eq!(sink.written, vec![1, 2], "only frames before the failure are written");
    assert!(!sink.finished);
}

#[test]
fn decode_failure_aborts_run() {
    let source = VecSource::failing_at(&[1, 2, 3, 4], 1);
    let detector = CountingDetector::default();
    let mut sink = VecSink::default();

    let err = run_frame_loop(source, &detector, &mut sink).unwrap_err();

    assert!(matches!(err, MediaError::InvalidVideo(_)));
    assert_eq!(sink.written, vec![1]);
}

#[test]
fn iterator_fuses_after_error() {
    let source = VecSource::new(&[1, 2, 3]);
    let detector = CountingDetector::failing_at(1);

    let mut frames = AnnotatedFrames::new(source, &detector);

    assert!(frames.next().unwrap().is_ok());
    assert!(frames.next().unwrap().is_err());
    assert!(frames.next().is_none(), "iterator must yield nothing after an error");
    assert!(frames.next().is_none());
}

#[test]
fn iterator_fuses_after_end_of_stream() {
    let source = VecSource::new(&[7]);
    let detector = CountingDetector::default();

    let mut frames = AnnotatedFrames::new(source, &detector);

    assert!(frames.next().unwrap().is_ok());
    assert!(frames.next().is_none());
    assert!(frames.next().is_none());
    assert_eq!(detector.calls(), 1);
}
