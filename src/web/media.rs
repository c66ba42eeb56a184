use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, header::CONTENT_TYPE},
    routing::post,
};
use serde_json::{Value, json};

use crate::{
    AppResult, AppState,
    client::EchoClient,
    media::{MAX_UPLOAD_BYTES, MediaUpload},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(upload))
        // leave room for our own size check to answer first
        .layer(DefaultBodyLimit::max(2 * MAX_UPLOAD_BYTES))
}

/// Raw image body; the type comes from `Content-Type`.
#[debug_handler]
pub(crate) async fn upload(
    State(client): State<Arc<EchoClient>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> AppResult<Json<Value>> {
    let owner = client.require_identity()?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let url = client
        .upload_media(owner.id, MediaUpload { content_type, bytes: bytes.to_vec() })
        .await?;
    Ok(Json(json!({ "url": url })))
}
