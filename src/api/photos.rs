//! Student photo upload and removal.

use axum::{
    extract::{Multipart, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::access::{Actor, Target};
use crate::db::{Student, User};
use crate::AppState;

use super::ensure_access;
use super::error::{ApiError, ApiPath};
use super::students::load_student;

const PHOTO_FIELD: &str = "photo";

/// POST /api/students/:id/photo (multipart, one `photo` field)
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
    mut multipart: Multipart,
) -> Result<Json<Student>, ApiError> {
    let student = load_student(&state, id).await?;
    ensure_access(&Actor::from(&user), Target::student(&student), "Not your student")?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        upload = Some((content_type, data));
        break;
    }
    let (content_type, data) =
        upload.ok_or_else(|| ApiError::validation_field(PHOTO_FIELD, "A photo file is required"))?;

    let format = state.photos.check_upload(content_type.as_deref(), &data)?;
    let stored = state.photos.store(data, format).await?;

    let updated = state
        .store
        .set_student_photo(id, Some((&stored.url, &stored.public_id)))
        .await?;
    let Some(updated) = updated else {
        // Deleted while uploading
        state.photos.remove(&stored.public_id).await;
        return Err(ApiError::not_found("Student not found"));
    };

    if let Some(old) = &student.photo_public_id {
        state.photos.remove(old).await;
    }

    info!(student_id = id, public_id = %stored.public_id, "Stored student photo");
    Ok(Json(updated))
}

/// DELETE /api/students/:id/photo
pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Student>, ApiError> {
    let student = load_student(&state, id).await?;
    ensure_access(&Actor::from(&user), Target::student(&student), "Not your student")?;

    let updated = state
        .store
        .set_student_photo(id, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Student not found"))?;

    if let Some(old) = &student.photo_public_id {
        state.photos.remove(old).await;
    }

    info!(student_id = id, "Removed student photo");
    Ok(Json(updated))
}
