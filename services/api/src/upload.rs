//! Profile photo uploads

use axum::{
    Extension, Json,
    extract::{Multipart, State},
};
use bytes::Bytes;
use chrono::Utc;
use common::{
    error::{ApiError, ApiResult},
    models::User,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::{state::AppState, storage::PHOTOS_BUCKET};

const MAX_PHOTO_BYTES: usize = 15 * 1024 * 1024;
const PHOTO_TYPES: [&str; 4] = ["image/jpg", "image/jpeg", "image/png", "image/webp"];

/// A file part taken from a multipart body
#[derive(Debug)]
pub(crate) struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

/// Read the first part named `name`, skipping any others
pub(crate) async fn read_file_field(
    multipart: &mut Multipart,
    name: &str,
) -> ApiResult<Option<UploadedFile>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(name) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_lowercase();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            data,
        }));
    }

    Ok(None)
}

fn check_photo(file: &UploadedFile) -> ApiResult<()> {
    if !PHOTO_TYPES.contains(&file.content_type.as_str()) {
        return Err(ApiError::BadRequest(
            "Only image files are allowed".to_string(),
        ));
    }

    if file.data.len() > MAX_PHOTO_BYTES {
        return Err(ApiError::BadRequest(
            "File size exceeds the 15 MB limit".to_string(),
        ));
    }

    Ok(())
}

/// `user-<id>-photo-<millis>.<ext>`, extension from the file name or else the MIME subtype
fn photo_key(user_id: Uuid, file: &UploadedFile, millis: i64) -> String {
    let extension = file
        .file_name
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
        .or_else(|| {
            file.content_type
                .split_once('/')
                .map(|(_, subtype)| subtype.to_string())
        })
        .unwrap_or_else(|| "bin".to_string());

    format!("user-{}-photo-{}.{}", user_id, millis, extension)
}

/// Replace the caller's profile photo
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> ApiResult<Json<User>> {
    let file = read_file_field(&mut multipart, "file")
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    check_photo(&file)?;

    let key = photo_key(user.id, &file, Utc::now().timestamp_millis());
    let url = state
        .storage
        .upload(PHOTOS_BUCKET, &key, file.data.to_vec(), &file.content_type)
        .await
        .map_err(|e| {
            error!("Failed to store photo for {}: {:#}", user.id, e);
            ApiError::ServiceUnavailable("Failed to upload file".to_string())
        })?;

    let updated = state.user_repository.update_photo(user.id, &url).await?;
    info!("User {} uploaded a new photo", user.id);

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: Option<&str>, content_type: &str, len: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.map(str::to_string),
            content_type: content_type.to_string(),
            data: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn test_check_photo() {
        assert!(check_photo(&file(Some("me.png"), "image/png", 10)).is_ok());
        assert!(matches!(
            check_photo(&file(Some("me.gif"), "image/gif", 10)),
            Err(ApiError::BadRequest(message)) if message == "Only image files are allowed"
        ));
        assert!(matches!(
            check_photo(&file(Some("me.jpg"), "image/jpeg", MAX_PHOTO_BYTES + 1)),
            Err(ApiError::BadRequest(message)) if message == "File size exceeds the 15 MB limit"
        ));
    }

    #[test]
    fn test_photo_key() {
        let id = Uuid::nil();
        assert_eq!(
            photo_key(id, &file(Some("Me.PNG"), "image/png", 1), 1700000000000),
            format!("user-{id}-photo-1700000000000.png")
        );
        assert_eq!(
            photo_key(id, &file(None, "image/webp", 1), 5),
            format!("user-{id}-photo-5.webp")
        );
    }
}
