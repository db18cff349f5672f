//! Shared data models for the detweb detection service.
//!
//! This crate provides the plain types shared by the media pipelines and the
//! HTTP surface:
//! - Media-kind classification by file extension
//! - Upload identifiers and collision-resistant stored names

pub mod media_kind;
pub mod upload;

pub use media_kind::MediaKind;
pub use upload::{sanitize_base_name, StoredName, UploadId};
