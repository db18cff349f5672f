//! Detector capability boundary.
//!
//! A detector takes one decoded BGR frame and returns labeled boxes plus a
//! rendered annotated frame of identical dimensions. It is synchronous and
//! blocking; the pipelines call it once per frame with no batching.

use opencv::core::Mat;
use opencv::prelude::*;

use crate::error::MediaResult;

/// Detected object with bounding box and classification.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box in normalized coordinates [0, 1]
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// COCO class ID (0 = person, 2 = car, etc.)
    pub class_id: usize,
    /// Detection confidence [0, 1]
    pub confidence: f32,
}

impl Detection {
    /// Check if this is a person detection.
    pub fn is_person(&self) -> bool {
        self.class_id == 0
    }

    /// Human-readable class label.
    pub fn label(&self) -> &'static str {
        COCO_CLASSES.get(self.class_id).copied().unwrap_or("unknown")
    }

    /// Get the center point in normalized coordinates.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Get area (normalized).
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Result of running the detector over one frame or image.
#[derive(Debug)]
pub struct AnnotatedFrame {
    /// Rendered frame with boxes and labels drawn, same dimensions as input.
    pub frame: Mat,
    /// Structured detections for this frame.
    pub detections: Vec<Detection>,
}

impl AnnotatedFrame {
    /// Annotated frame dimensions (width, height).
    pub fn dimensions(&self) -> (i32, i32) {
        (self.frame.cols(), self.frame.rows())
    }
}

/// Object detection capability, injected into the pipelines.
///
/// Implementations are loaded once at process start and shared across
/// requests; they must be internally synchronized.
pub trait Detector: Send + Sync {
    /// Detect objects in a single BGR frame and render the annotations.
    ///
    /// The returned frame must have the same dimensions as the input.
    fn detect(&self, frame: &Mat) -> MediaResult<AnnotatedFrame>;
}

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_helpers() {
        let detection = Detection {
            x: 0.1,
            y: 0.2,
            width: 0.3,
            height: 0.4,
            class_id: 0,
            confidence: 0.9,
        };

        assert!(detection.is_person());
        assert_eq!(detection.label(), "person");
        assert!((detection.center().0 - 0.25).abs() < 0.001);
        assert!((detection.center().1 - 0.4).abs() < 0.001);
        assert!((detection.area() - 0.12).abs() < 0.001);
    }

    #[test]
    fn test_coco_classes() {
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(COCO_CLASSES[2], "car");
        assert_eq!(COCO_CLASSES.len(), 80);
    }

    #[test]
    fn test_unknown_class_label() {
        let detection = Detection {
            x: 0.0,
            y: 0.0,
            width: 0.1,
            height: 0.1,
            class_id: 999,
            confidence: 0.5,
        };
        assert_eq!(detection.label(), "unknown");
    }
}
