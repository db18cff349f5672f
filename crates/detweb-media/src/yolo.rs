//! YOLOv8 ONNX object detector.
//!
//! Loads the model once and runs inference through ONNX Runtime with
//! automatic execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms
//!
//! Annotation (boxes + class labels) is rendered onto a clone of the input
//! frame, so the output dimensions always equal the input dimensions.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array;
use opencv::core::{Mat, Point, Rect, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::detector::{AnnotatedFrame, Detection, Detector};
use crate::error::{MediaError, MediaResult};

/// Configuration for the YOLOv8 detector.
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Path to ONNX model file
    pub model_path: String,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Object detector backed by a YOLOv8 ONNX model.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: YoloConfig,
}

impl YoloDetector {
    /// Create a new detector from config.
    ///
    /// Returns an error if the model file doesn't exist or cannot be loaded.
    pub fn new(config: YoloConfig) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            "Object detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Preprocess a BGR frame for inference.
    ///
    /// Resize to the model input size, convert BGR to RGB, normalize to
    /// [0, 1] and lay out as NCHW.
    fn preprocess(&self, frame: &Mat) -> MediaResult<Value> {
        let size = self.config.input_size as i32;

        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(size, size),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb.data_bytes()?;
        let (w, h) = (size as usize, size as usize);
        if data.len() != w * h * 3 {
            return Err(MediaError::internal(format!(
                "Unexpected frame buffer length: expected {}, got {}",
                w * h * 3,
                data.len()
            )));
        }

        // HWC -> CHW with normalization to [0, 1]
        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    chw_data.push(data[(y * w + x) * 3 + c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
    }

    /// Run ONNX inference.
    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 84, 8400]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.iter().copied().collect())
    }

    /// Parse the YOLOv8 output and apply NMS.
    ///
    /// Output format: [1, 84, 8400] where 84 = 4 bbox coords (cx, cy, w, h)
    /// + 80 class scores, and 8400 is the candidate count.
    fn postprocess(
        &self,
        outputs: &[f32],
        orig_width: u32,
        orig_height: u32,
    ) -> MediaResult<Vec<Detection>> {
        let num_classes = 80;
        let num_boxes = 8400;
        let num_features = 84;

        if outputs.len() != num_features * num_boxes {
            return Err(MediaError::detection_failed(format!(
                "Unexpected output size: expected {}, got {}",
                num_features * num_boxes,
                outputs.len()
            )));
        }

        let output_array = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
            .map_err(|e| MediaError::internal(format!("Failed to reshape output: {}", e)))?;
        let transposed = output_array.t(); // [8400, 84]

        let mut candidates: Vec<Detection> = Vec::new();
        let input_size = self.config.input_size as f32;
        let scale_w = orig_width as f32 / input_size;
        let scale_h = orig_height as f32 / input_size;

        for i in 0..num_boxes {
            let cx = transposed[[i, 0]];
            let cy = transposed[[i, 1]];
            let w = transposed[[i, 2]];
            let h = transposed[[i, 3]];

            let mut best_class = 0;
            let mut best_score = 0.0f32;
            for c in 0..num_classes {
                let score = transposed[[i, 4 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < self.config.confidence_threshold {
                continue;
            }

            // Center format -> corner format, scaled to source pixels
            let x = (cx - w / 2.0) * scale_w;
            let y = (cy - h / 2.0) * scale_h;
            let width = w * scale_w;
            let height = h * scale_h;

            // Normalize to [0, 1] and clamp
            let x_norm = (x / orig_width as f32).clamp(0.0, 1.0);
            let y_norm = (y / orig_height as f32).clamp(0.0, 1.0);
            let w_norm = (width / orig_width as f32).min(1.0 - x_norm);
            let h_norm = (height / orig_height as f32).min(1.0 - y_norm);

            candidates.push(Detection {
                x: x_norm,
                y: y_norm,
                width: w_norm,
                height: h_norm,
                class_id: best_class,
                confidence: best_score,
            });
        }

        Ok(non_maximum_suppression(candidates, self.config.nms_threshold))
    }

    /// Draw labeled boxes onto a clone of the input frame.
    fn annotate(&self, frame: &Mat, detections: &[Detection]) -> MediaResult<Mat> {
        let mut annotated = frame.try_clone()?;
        let (img_w, img_h) = (frame.cols() as f32, frame.rows() as f32);

        for det in detections {
            let rect = Rect::new(
                (det.x * img_w) as i32,
                (det.y * img_h) as i32,
                (det.width * img_w) as i32,
                (det.height * img_h) as i32,
            );
            let color = class_color(det.class_id);

            imgproc::rectangle(&mut annotated, rect, color, 2, imgproc::LINE_8, 0)?;

            let label = format!("{} {:.2}", det.label(), det.confidence);
            let mut baseline = 0;
            let text_size = imgproc::get_text_size(
                &label,
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                1,
                &mut baseline,
            )?;

            // Label background just above the box, clamped into the frame
            let label_y = (rect.y - text_size.height - 4).max(0);
            let bg = Rect::new(rect.x, label_y, text_size.width + 4, text_size.height + 4);
            imgproc::rectangle(&mut annotated, bg, color, imgproc::FILLED, imgproc::LINE_8, 0)?;

            imgproc::put_text(
                &mut annotated,
                &label,
                Point::new(rect.x + 2, label_y + text_size.height + 1),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                Scalar::new(255.0, 255.0, 255.0, 0.0),
                1,
                imgproc::LINE_8,
                false,
            )?;
        }

        Ok(annotated)
    }
}

impl Detector for YoloDetector {
    fn detect(&self, frame: &Mat) -> MediaResult<AnnotatedFrame> {
        if frame.empty() || frame.cols() <= 0 || frame.rows() <= 0 {
            return Err(MediaError::detection_failed("Empty input frame"));
        }

        let (width, height) = (frame.cols() as u32, frame.rows() as u32);

        let input = self.preprocess(frame)?;
        let outputs = self.run_inference(input)?;
        let detections = self.postprocess(&outputs, width, height)?;

        debug!(count = detections.len(), "Object detection completed");

        let annotated = self.annotate(frame, &detections)?;

        Ok(AnnotatedFrame {
            frame: annotated,
            detections,
        })
    }
}

/// Apply Non-Maximum Suppression to remove overlapping same-class boxes.
fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if compute_iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection over Union between two normalized boxes.
fn compute_iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Stable per-class box color (BGR).
fn class_color(class_id: usize) -> Scalar {
    const PALETTE: &[(f64, f64, f64)] = &[
        (56.0, 56.0, 255.0),
        (31.0, 112.0, 255.0),
        (29.0, 178.0, 255.0),
        (49.0, 210.0, 207.0),
        (10.0, 249.0, 72.0),
        (23.0, 204.0, 146.0),
        (134.0, 219.0, 61.0),
        (52.0, 147.0, 26.0),
        (187.0, 212.0, 0.0),
        (168.0, 153.0, 44.0),
    ];
    let (b, g, r) = PALETTE[class_id % PALETTE.len()];
    Scalar::new(b, g, r, 0.0)
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let mut builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    // Try CUDA on Linux with cuda feature
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    // Try CoreML on macOS
    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, class_id: usize, confidence: f32) -> Detection {
        Detection {
            x,
            y,
            width: w,
            height: h,
            class_id,
            confidence,
        }
    }

    #[test]
    fn test_config_default() {
        let config = YoloConfig::default();
        assert_eq!(config.input_size, 640);
        assert!((config.confidence_threshold - 0.25).abs() < 0.001);
        assert!((config.nms_threshold - 0.45).abs() < 0.001);
    }

    #[test]
    fn test_iou_identical_boxes() {
        let a = det(0.1, 0.1, 0.2, 0.2, 0, 0.9);
        let b = det(0.1, 0.1, 0.2, 0.2, 0, 0.8);
        assert!((compute_iou(&a, &b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = det(0.0, 0.0, 0.1, 0.1, 0, 0.9);
        let b = det(0.5, 0.5, 0.1, 0.1, 0, 0.9);
        assert_eq!(compute_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlap_same_class() {
        let detections = vec![
            det(0.1, 0.1, 0.2, 0.2, 0, 0.9),
            det(0.11, 0.11, 0.2, 0.2, 0, 0.7),
            det(0.7, 0.7, 0.1, 0.1, 0, 0.8),
        ];
        let kept = non_maximum_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 0.001);
    }

    #[test]
    fn test_nms_keeps_overlap_across_classes() {
        let detections = vec![
            det(0.1, 0.1, 0.2, 0.2, 0, 0.9),
            det(0.1, 0.1, 0.2, 0.2, 2, 0.8),
        ];
        let kept = non_maximum_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_missing_model_file() {
        let config = YoloConfig {
            model_path: "/nonexistent/yolov8n.onnx".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            YoloDetector::new(config),
            Err(MediaError::ModelNotFound(_))
        ));
    }
}
