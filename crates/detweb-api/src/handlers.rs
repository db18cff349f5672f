//! HTTP handlers: upload, result serving, index, health.

use std::path::Path as FsPath;

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::fs;
use tracing::info;

use detweb_media::{annotate_image, process_video};
use detweb_models::{MediaKind, StoredName, UploadId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Embedded upload page.
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Response for a processed upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Filename of the annotated artifact, retrievable under /outputs.
    pub result_file: String,
    pub media_kind: MediaKind,
    /// Objects found (image uploads only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections: Option<usize>,
    /// Frames annotated (video uploads only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,
    /// Whether the video result is web-transcoded or the intermediate
    /// encoding kept after a transcode failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcoded: Option<bool>,
}

/// GET / — upload page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /upload — accept one file, run the matching pipeline.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .ok_or_else(|| ApiError::bad_request("Missing filename"))?
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
            file = Some((filename, data.to_vec()));
            break;
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::bad_request("Missing file field"))?;
    if data.is_empty() {
        return Err(ApiError::bad_request("Empty upload"));
    }

    // Classification happens before anything touches the filesystem, so an
    // unsupported upload leaves no artifact behind.
    let kind = MediaKind::classify(&filename)
        .ok_or_else(|| ApiError::unsupported_media(filename.clone()))?;

    let id = UploadId::new();
    let name = StoredName::new(&id, &filename);

    fs::create_dir_all(&state.config.output_dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create output dir: {}", e)))?;

    let input_path = state.config.output_dir.join(name.input());
    fs::write(&input_path, &data)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;

    info!(
        upload_id = %id,
        filename = %filename,
        size = data.len(),
        kind = ?kind,
        "Upload stored"
    );

    let result_file = name.detected();
    let output_path = state.config.output_dir.join(&result_file);

    let response = match kind {
        MediaKind::Image => {
            let detector = state.detector.clone();
            let input = input_path.clone();
            let output = output_path.clone();

            let detections = tokio::task::spawn_blocking(move || {
                annotate_image(detector.as_ref(), &input, &output)
            })
            .await
            .map_err(|e| ApiError::internal(format!("Annotation task panicked: {}", e)))??;

            UploadResponse {
                result_file,
                media_kind: kind,
                detections: Some(detections.len()),
                frames: None,
                transcoded: None,
            }
        }
        MediaKind::Video => {
            let intermediate_path = state.config.output_dir.join(name.intermediate());

            let outcome = process_video(
                state.detector.clone(),
                state.transcoder.as_ref(),
                &input_path,
                &intermediate_path,
                &output_path,
            )
            .await?;

            UploadResponse {
                result_file,
                media_kind: kind,
                detections: None,
                frames: Some(outcome.frames),
                transcoded: Some(outcome.transcoded),
            }
        }
    };

    Ok(Json(response))
}

/// GET /outputs/:filename — serve a stored artifact.
///
/// Video results get an explicit `video/mp4` content type; images are
/// inferred from the extension.
pub async fn serve_output(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(ApiError::bad_request("Invalid filename"));
    }

    let path = state.config.output_dir.join(&filename);
    let bytes = fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found(filename.clone()))?;

    let content_type = content_type_for(&filename);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Content type for a result file, by extension.
fn content_type_for(filename: &str) -> &'static str {
    let ext = FsPath::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a_detected.mp4"), "video/mp4");
        assert_eq!(content_type_for("a_detected.MP4"), "video/mp4");
        assert_eq!(content_type_for("a_detected.png"), "image/png");
        assert_eq!(content_type_for("a_detected.JPG"), "image/jpeg");
        assert_eq!(content_type_for("mystery"), "application/octet-stream");
    }
}
