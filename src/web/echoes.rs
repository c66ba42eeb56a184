use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::post,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppResult, AppState, client::EchoClient};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(new_echo))
        .route("/{uuid}/like", post(like))
        .route("/{uuid}/unlike", post(unlike))
}

#[derive(Deserialize)]
pub(crate) struct NewEcho {
    content: String,
    #[serde(default)]
    media_url: Option<String>,
}

/// The global feed, newest first.
#[debug_handler]
pub(crate) async fn home(State(client): State<Arc<EchoClient>>) -> AppResult<Response> {
    if client.identity().is_none() {
        return Ok(Redirect::to("/auth").into_response());
    }

    let entries = client.refresh_home().await?;
    Ok(Json(entries).into_response())
}

#[debug_handler]
pub(crate) async fn new_echo(
    State(client): State<Arc<EchoClient>>,
    Json(NewEcho { content, media_url }): Json<NewEcho>,
) -> AppResult<Response> {
    let post = client.post_echo(&content, media_url.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(post)).into_response())
}

#[debug_handler]
pub(crate) async fn like(
    Path(post_id): Path<Uuid>,
    State(client): State<Arc<EchoClient>>,
) -> AppResult<Response> {
    Ok(Json(client.like(post_id).await?).into_response())
}

#[debug_handler]
pub(crate) async fn unlike(
    Path(post_id): Path<Uuid>,
    State(client): State<Arc<EchoClient>>,
) -> AppResult<Response> {
    Ok(Json(client.unlike(post_id).await?).into_response())
}
