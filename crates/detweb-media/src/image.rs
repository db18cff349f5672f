//! Still-image pipeline: one detector pass, write the annotated image.

use std::path::Path;

use opencv::core::Vector;
use opencv::imgcodecs;
use opencv::prelude::MatTraitConst;
use tracing::info;

use crate::detector::{Detection, Detector};
use crate::error::{MediaError, MediaResult};

/// Annotate a stored image and write the result.
///
/// The detector contract guarantees output dimensions equal input
/// dimensions; no resizing happens here. Failures (unreadable or
/// zero-dimension input) propagate to the caller; no retry.
pub fn annotate_image(
    detector: &dyn Detector,
    input: &Path,
    output: &Path,
) -> MediaResult<Vec<Detection>> {
    let frame = imgcodecs::imread(&input.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
    if frame.empty() {
        return Err(MediaError::InvalidImage(input.to_path_buf()));
    }

    let annotated = detector.detect(&frame)?;

    let written = imgcodecs::imwrite(
        &output.to_string_lossy(),
        &annotated.frame,
        &Vector::new(),
    )?;
    if !written {
        return Err(MediaError::internal(format!(
            "Failed to write annotated image: {}",
            output.display()
        )));
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        detections = annotated.detections.len(),
        "Image annotated"
    );

    Ok(annotated.detections)
}
