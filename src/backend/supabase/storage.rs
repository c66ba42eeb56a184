use async_trait::async_trait;
use reqwest::Method;

use crate::{
    media::{MediaRejection, MediaStore, MediaUpload, object_name},
    model::UserId,
};

use super::{Failure, Supabase};

pub struct SupabaseStorage {
    client: Supabase,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(client: Supabase, bucket: &str) -> Self {
        Self { client, bucket: bucket.to_owned() }
    }

    pub fn public_url(&self, name: &str) -> String {
        self.client
            .url(&format!("/storage/v1/object/public/{}/{name}", self.bucket))
    }
}

#[async_trait]
impl MediaStore for SupabaseStorage {
    async fn upload(&self, owner: UserId, upload: MediaUpload) -> Result<String, MediaRejection> {
        let name = object_name(owner, &upload.content_type);

        let resp = self
            .client
            .request(Method::POST, &format!("/storage/v1/object/{}/{name}", self.bucket))
            .header("Content-Type", upload.content_type)
            .body(upload.bytes)
            .send()
            .await
            .map_err(|e| MediaRejection::UploadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let failure = Failure::read(resp).await;
            return Err(MediaRejection::UploadFailed(failure.message));
        }
        Ok(self.public_url(&name))
    }
}
