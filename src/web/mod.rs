//! HTTP shell over one [`EchoClient`].

mod auth;
mod echoes;
mod media;
mod profiles;
mod trending;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, extract::FromRef, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::client::EchoClient;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub client: Arc<EchoClient>,
}

/// Every route of the shell. `media_dir` is served at `/media` when uploads
/// are stored locally.
pub fn router(state: AppState, media_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/", get(echoes::home))
        .route("/trending", get(trending::trending))
        .merge(auth::router())
        .merge(media::router())
        .nest("/echoes", echoes::router())
        .nest("/p", profiles::router());

    if let Some(dir) = media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}
