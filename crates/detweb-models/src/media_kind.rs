//! Media-kind classification.
//!
//! Classification is purely by file extension, case-insensitive. No content
//! sniffing is performed; a mislabeled file is caught later when the decoder
//! rejects it.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of media an upload contains, used to select the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// Extensions recognized as still images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extensions recognized as video.
const VIDEO_EXTENSIONS: &[&str] = &["mp4"];

impl MediaKind {
    /// Classify a filename by its extension.
    ///
    /// Returns `None` for unrecognized extensions (or no extension at all);
    /// the caller must reject the upload without attempting detection.
    pub fn classify(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Content type to serve results with.
    ///
    /// Video results get an explicit `video/mp4`; images are left to
    /// extension-based inference by the caller.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Video => Some("video/mp4"),
            Self::Image => None,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}
