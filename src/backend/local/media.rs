use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    media::{MediaRejection, MediaStore, MediaUpload, object_name},
    model::UserId,
};

/// Writes uploads under `dir`; the web shell serves that directory at `/media`.
pub struct LocalMediaStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalMediaStore {
    pub fn new(dir: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base: public_base.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, owner: UserId, upload: MediaUpload) -> Result<String, MediaRejection> {
        let name = object_name(owner, &upload.content_type);
        let path = self.dir.join(&name);
        let failed = |e: std::io::Error| MediaRejection::UploadFailed(e.to_string());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }
        tokio::fs::write(&path, &upload.bytes).await.map_err(failed)?;

        Ok(format!("{}/media/{name}", self.public_base))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn writes_file_and_returns_public_url() {
        let dir = std::env::temp_dir().join(format!("echoes-media-{}", Uuid::new_v4()));
        let store = LocalMediaStore::new(&dir, "http://localhost:3000/");
        let owner = Uuid::new_v4();

        let url = store
            .upload(owner, MediaUpload { content_type: "image/png".into(), bytes: vec![1, 2, 3] })
            .await
            .unwrap();

        let name = url.strip_prefix("http://localhost:3000/media/").unwrap();
        assert!(name.starts_with(&owner.to_string()));
        assert_eq!(tokio::fs::read(dir.join(name)).await.unwrap(), vec![1, 2, 3]);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
