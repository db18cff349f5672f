//! Upload identifiers and stored-name derivation.
//!
//! Every upload gets a random [`UploadId`] prefix, so concurrent requests
//! cannot collide in the shared output directory. The user-supplied base
//! name is kept for readability but stripped of filesystem-unsafe
//! characters first.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single upload request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sanitize a user-supplied base name for filesystem use.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; every other character is
/// replaced with `_`.
pub fn sanitize_base_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A stored filename of the form `{id}_{sanitized_base}{ext}`, plus the
/// derived names the pipelines write to.
///
/// The extension is preserved as uploaded (case included), so a result for
/// `photo.JPG` ends in `_detected.JPG`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredName {
    /// Filename stem: `{id}_{sanitized_base}`.
    stem: String,
    /// Extension including the leading dot, or empty.
    ext: String,
}

impl StoredName {
    /// Build a stored name for an upload.
    pub fn new(id: &UploadId, original_filename: &str) -> Self {
        let (base, ext) = split_extension(original_filename);
        Self {
            stem: format!("{}_{}", id, sanitize_base_name(base)),
            ext: ext.to_string(),
        }
    }

    /// The name the raw upload is saved under.
    pub fn input(&self) -> String {
        format!("{}{}", self.stem, self.ext)
    }

    /// The final annotated output name, with the `_detected` marker before
    /// the extension.
    pub fn detected(&self) -> String {
        format!("{}_detected{}", self.stem, self.ext)
    }

    /// The intermediate-encode name used by the video pipeline.
    pub fn intermediate(&self) -> String {
        format!("{}_temp{}", self.stem, self.ext)
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input())
    }
}

/// Split a filename into (base, extension-with-dot).
///
/// The extension is the suffix after the last dot, unless the name starts
/// with that dot (hidden files have no extension).
fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename.split_at(idx),
        _ => (filename, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_id() -> UploadId {
        UploadId("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".to_string())
    }

    #[test]
    fn test_sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_base_name("video-01_final.v2"), "video-01_final.v2");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_base_name("my photo!"), "my_photo_");
        assert_eq!(sanitize_base_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_base_name("ünïcode"), "_n_code");
    }

    #[test]
    fn test_stored_name_shape() {
        let name = StoredName::new(&fixed_id(), "my photo!.JPG");
        assert_eq!(
            name.input(),
            "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee_my_photo_.JPG"
        );
        assert!(name.detected().ends_with("_detected.JPG"));
        assert!(name.intermediate().ends_with("_temp.JPG"));
    }

    #[test]
    fn test_detected_marker_before_extension() {
        let name = StoredName::new(&fixed_id(), "clip.mp4");
        assert_eq!(
            name.detected(),
            "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee_clip_detected.mp4"
        );
    }

    #[test]
    fn test_no_extension() {
        let name = StoredName::new(&fixed_id(), "rawfile");
        assert_eq!(name.input(), "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee_rawfile");
        assert!(name.detected().ends_with("_rawfile_detected"));
    }

    #[test]
    fn test_hidden_file_has_no_extension() {
        let (base, ext) = split_extension(".gitignore");
        assert_eq!(base, ".gitignore");
        assert_eq!(ext, "");
    }

    #[test]
    fn test_unique_per_request() {
        let a = StoredName::new(&UploadId::new(), "clip.mp4");
        let b = StoredName::new(&UploadId::new(), "clip.mp4");
        assert_ne!(a.input(), b.input());
    }
}
