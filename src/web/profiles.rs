use std::sync::Arc;

use axum::{
    Form, Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    client::EchoClient,
    include_res,
    model::{FeedEntry, Profile, ProfileUpdate},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(own_profile).post(create_profile))
        .route("/edit", post(edit_profile))
        .route("/{uuid}", get(profile))
}

#[derive(Serialize)]
pub(crate) struct ProfilePage {
    profile: Profile,
    echoes: Vec<FeedEntry>,
}

#[derive(Deserialize)]
pub(crate) struct NewProfileForm {
    username: String,
    full_name: String,
}

#[debug_handler]
pub(crate) async fn own_profile(State(client): State<Arc<EchoClient>>) -> AppResult<Response> {
    let Some(me) = client.identity() else {
        return Ok(Redirect::to("/auth").into_response());
    };

    let Some(profile) = client.own_profile().await? else {
        return Ok(Html(include_res!(str, "/pages/create_profile.html")).into_response());
    };

    let echoes = client.refresh_profile_feed(me.id).await?;
    Ok(Json(ProfilePage { profile, echoes }).into_response())
}

#[debug_handler]
pub(crate) async fn profile(
    Path(profile_id): Path<Uuid>,
    State(client): State<Arc<EchoClient>>,
) -> AppResult<Response> {
    if client.identity().is_none() {
        return Ok(Redirect::to("/auth").into_response());
    }

    let Some(profile) = client.profile(profile_id).await? else {
        return Ok((StatusCode::NOT_FOUND, "profile not found").into_response());
    };

    let echoes = client.refresh_profile_feed(profile_id).await?;
    Ok(Json(ProfilePage { profile, echoes }).into_response())
}

#[debug_handler]
pub(crate) async fn create_profile(
    State(client): State<Arc<EchoClient>>,
    Form(NewProfileForm { username, full_name }): Form<NewProfileForm>,
) -> AppResult<Redirect> {
    client.create_profile(&username, &full_name).await?;
    Ok(Redirect::to("/p"))
}

#[debug_handler]
pub(crate) async fn edit_profile(
    State(client): State<Arc<EchoClient>>,
    Form(update): Form<ProfileUpdate>,
) -> AppResult<Redirect> {
    client.update_profile(update).await?;
    Ok(Redirect::to("/p"))
}
