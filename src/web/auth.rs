use std::sync::Arc;

use axum::{
    Form, Router, debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::{AppResult, AppState, auth::SignUpForm, client::EchoClient, include_res};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(auth_page))
        .route("/auth/signin", post(sign_in))
        .route("/auth/signup", post(sign_up))
        .route("/auth/signout", post(sign_out))
}

#[derive(Deserialize)]
pub(crate) struct SignInForm {
    email: String,
    password: String,
}

#[debug_handler]
pub(crate) async fn auth_page() -> impl IntoResponse {
    Html(include_res!(str, "/pages/auth.html"))
}

#[debug_handler]
pub(crate) async fn sign_in(
    State(client): State<Arc<EchoClient>>,
    Form(SignInForm { email, password }): Form<SignInForm>,
) -> AppResult<Response> {
    client.sign_in(&email, &password).await?;
    Ok(Redirect::to("/").into_response())
}

#[debug_handler]
pub(crate) async fn sign_up(
    State(client): State<Arc<EchoClient>>,
    Form(form): Form<SignUpForm>,
) -> AppResult<Response> {
    let profile = client.sign_up(form).await?;

    // unconfirmed accounts have no session yet
    if client.identity().is_none() {
        return Ok(Redirect::to("/auth").into_response());
    }
    Ok(Redirect::to(&format!("/p/{}", profile.id)).into_response())
}

#[debug_handler]
pub(crate) async fn sign_out(State(client): State<Arc<EchoClient>>) -> AppResult<Redirect> {
    client.sign_out().await?;
    Ok(Redirect::to("/auth"))
}
