use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};

use crate::client::{EchoClient, TrendingSnapshot};

/// Whatever the poller displayed last. Never fails.
#[debug_handler]
pub(crate) async fn trending(State(client): State<Arc<EchoClient>>) -> Json<TrendingSnapshot> {
    Json(client.trending())
}
