use std::io;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::{ReaderStream, StreamReader};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extractors::OwnerId;
use crate::models::resume::ResumeRow;
use crate::resumes::service::{CreateResume, CreatedResume};
use crate::resumes::validation::{read_bounded, Upload, ValidationError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RenameRequest {
    pub resume_name: String,
}

/// GET /api/v1/resumes
pub async fn handle_list(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
) -> Result<Json<Vec<ResumeRow>>, AppError> {
    Ok(Json(state.resumes.list(owner).await?))
}

/// POST /api/v1/resumes
///
/// Multipart fields: `file`, `resume_name`, `industry`, `yoe_bucket`.
pub async fn handle_create(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedResume>), AppError> {
    let max_file_size = state.resumes.limits().max_file_size;
    let bad_multipart = |e: MultipartError| multipart_error(e, max_file_size);

    let mut upload: Option<Upload> = None;
    let mut name = String::new();
    let mut industry = String::new();
    let mut yoe_bucket = String::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let reader =
                    StreamReader::new(field.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
                // Never buffer more than one byte past the limit.
                let bytes = read_bounded(reader, max_file_size)
                    .await
                    .map_err(|e| upload_read_error(e, max_file_size))?;
                // Draining the rest of an oversized field would trip the body limit.
                if bytes.len() as u64 > max_file_size {
                    return Err(AppError::InvalidDocument(ValidationError::TooLarge {
                        limit: max_file_size,
                    }));
                }
                upload = Some(Upload {
                    declared_size: bytes.len() as u64,
                    declared_content_type: content_type,
                    bytes,
                });
            }
            "resume_name" => name = field.text().await.map_err(bad_multipart)?,
            "industry" => industry = field.text().await.map_err(bad_multipart)?,
            "yoe_bucket" => yoe_bucket = field.text().await.map_err(bad_multipart)?,
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::Validation("A file is required".to_string()))?;
    let created = state
        .resumes
        .create(
            owner,
            CreateResume {
                name,
                industry,
                yoe_bucket,
                upload,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// PATCH /api/v1/resumes/:id
pub async fn handle_rename(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<ResumeRow>, AppError> {
    let row = state.resumes.rename(owner, id, &req.resume_name).await?;
    Ok(Json(row))
}

/// DELETE /api/v1/resumes/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.resumes.delete(owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/resumes/:id/download
pub async fn handle_download(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let download = state.resumes.download(owner, id).await?;

    let headers = [
        (header::CONTENT_TYPE, download.content_type),
        (header::CONTENT_LENGTH, download.content_length.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.filename),
        ),
        (
            header::CACHE_CONTROL,
            "no-cache, no-store, must-revalidate".to_string(),
        ),
        (header::PRAGMA, "no-cache".to_string()),
        (header::EXPIRES, "0".to_string()),
    ];
    let body = Body::from_stream(ReaderStream::new(download.body));

    Ok((headers, body).into_response())
}

/// POST /api/v1/resumes/:id/preview
pub async fn handle_refresh_preview(
    State(state): State<AppState>,
    OwnerId(owner): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeRow>, AppError> {
    let row = state.resumes.refresh_preview(owner, id).await?;
    Ok(Json(row))
}

fn multipart_error(err: MultipartError, max_file_size: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::InvalidDocument(ValidationError::TooLarge {
            limit: max_file_size,
        });
    }
    AppError::Validation(format!("Invalid multipart body: {err}"))
}

fn upload_read_error(err: io::Error, max_file_size: u64) -> AppError {
    let body_limit_hit = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .is_some_and(|e| e.status() == StatusCode::PAYLOAD_TOO_LARGE);
    if body_limit_hit {
        return AppError::InvalidDocument(ValidationError::TooLarge {
            limit: max_file_size,
        });
    }
    AppError::Validation(format!("Failed to read upload: {err}"))
}
