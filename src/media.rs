use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::UserId;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaRejection {
    #[error("please upload a valid image file (JPEG, PNG, or GIF)")]
    WrongType,
    #[error("file size must be less than 5MB")]
    TooLarge,
    #[error("failed to upload image: {0}")]
    UploadFailed(String),
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores an already validated upload and returns its public URL.
    async fn upload(&self, owner: UserId, upload: MediaUpload) -> Result<String, MediaRejection>;
}

pub fn validate_upload(upload: &MediaUpload) -> Result<(), MediaRejection> {
    if !ALLOWED_TYPES.contains(&upload.content_type.as_str()) {
        return Err(MediaRejection::WrongType);
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(MediaRejection::TooLarge);
    }
    Ok(())
}

/// Validates, then hands the upload to `store`.
pub async fn upload_image(
    store: &dyn MediaStore,
    owner: UserId,
    upload: MediaUpload,
) -> Result<String, MediaRejection> {
    validate_upload(&upload)?;
    let size = upload.bytes.len();
    let url = store.upload(owner, upload).await?;
    tracing::info!(%owner, size, %url, "uploaded image");
    Ok(url)
}

/// `{owner}/{uuid}.{ext}`, unique per upload.
pub fn object_name(owner: UserId, content_type: &str) -> String {
    let ext = match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        _ => "jpg",
    };
    format!("{owner}/{}.{ext}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(content_type: &str, len: usize) -> MediaUpload {
        MediaUpload {
            content_type: content_type.to_owned(),
            bytes: vec![0; len],
        }
    }

    #[test]
    fn accepts_allowed_images_up_to_the_limit() {
        for ty in ALLOWED_TYPES {
            assert_eq!(validate_upload(&upload(ty, MAX_UPLOAD_BYTES)), Ok(()));
        }
    }

    #[test]
    fn rejects_other_types() {
        assert_eq!(validate_upload(&upload("image/webp", 10)), Err(MediaRejection::WrongType));
        assert_eq!(validate_upload(&upload("text/plain", 10)), Err(MediaRejection::WrongType));
    }

    #[test]
    fn rejects_oversized_files() {
        assert_eq!(
            validate_upload(&upload("image/png", MAX_UPLOAD_BYTES + 1)),
            Err(MediaRejection::TooLarge)
        );
    }

    #[test]
    fn object_names_are_scoped_by_owner() {
        let owner = Uuid::now_v7();
        let name = object_name(owner, "image/gif");
        assert!(name.starts_with(&format!("{owner}/")));
        assert!(name.ends_with(".gif"));
        assert_ne!(name, object_name(owner, "image/gif"));
    }
}
