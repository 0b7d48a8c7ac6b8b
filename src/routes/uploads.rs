use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Serialize)]
pub struct UploadResponse {
    pub url: String,
}

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
}

/// Canonical file extension for an accepted image MIME type.
pub fn image_extension(mime: &str) -> Option<&'static str> {
    match mime.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn too_large(limit: usize) -> AppError {
    AppError::PayloadTooLarge {
        code: "FILE_TOO_LARGE",
        message: format!("File exceeds the {} byte limit", limit),
    }
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit)
    } else {
        AppError::bad_request("INVALID_MULTIPART", err.body_text())
    }
}

async fn upload_image(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let limit = state.config.storage.max_upload_bytes;
    let mut multipart = multipart
        .map_err(|_| AppError::bad_request("MISSING_FILE", "A multipart \"file\" field is required"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let mime = match field.content_type() {
            Some(ct) if ct != "application/octet-stream" => ct.to_string(),
            _ => field
                .file_name()
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|m| m.essence_str().to_string())
                .unwrap_or_default(),
        };
        let ext = image_extension(&mime).ok_or_else(|| {
            AppError::bad_request(
                "INVALID_FILE_TYPE",
                "Only JPEG, PNG, GIF and WebP images are allowed",
            )
        })?;

        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if data.is_empty() {
            return Err(AppError::bad_request("MISSING_FILE", "Uploaded file is empty"));
        }
        if data.len() > limit {
            return Err(too_large(limit));
        }

        let dir = state.config.uploads_path();
        tokio::fs::create_dir_all(&dir).await?;
        let filename = format!("{}.{}", uuid::Uuid::now_v7(), ext);
        tokio::fs::write(dir.join(&filename), &data).await?;

        tracing::info!(user_id = %user.id, file = %filename, bytes = data.len(), "Image uploaded");
        let body = UploadResponse {
            url: format!("/uploads/{}", filename),
        };
        return Ok((StatusCode::CREATED, Json(body)).into_response());
    }

    Err(AppError::bad_request(
        "MISSING_FILE",
        "A multipart \"file\" field is required",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_image_types() {
        assert_eq!(image_extension("image/jpeg"), Some("jpg"));
        assert_eq!(image_extension("image/JPG"), Some("jpg"));
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("image/gif"), Some("gif"));
        assert_eq!(image_extension("image/webp"), Some("webp"));
        assert_eq!(image_extension("image/svg+xml"), None);
        assert_eq!(image_extension("text/plain"), None);
    }

    #[test]
    fn guessed_mime_from_filename_is_accepted() {
        let guessed = mime_guess::from_path("cat.jpeg").first().unwrap();
        assert_eq!(image_extension(guessed.essence_str()), Some("jpg"));
    }
}
