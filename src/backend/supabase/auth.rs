use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    auth::{AuthEvent, AuthEvents, AuthProvider, AuthSubscription},
    error::{EchoError, EchoResult},
    model::{Identity, Session},
};

use super::{Failure, Supabase};

/// Refresh this many seconds before the access token runs out.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// GoTrue password sessions. The session lives in the shared [`Supabase`]
/// handle so row and storage requests run as the signed-in user.
pub struct SupabaseAuth {
    client: Supabase,
    events: AuthEvents,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token.expires_at.or_else(|| {
            token
                .expires_in
                .map(|secs| OffsetDateTime::now_utc().unix_timestamp() + secs)
        });
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

/// `signup` returns a session when the project auto-confirms and the bare
/// user otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(Identity),
}

/// GoTrue rejects bad credentials and weak passwords with 400/422.
fn auth_error(failure: Failure) -> EchoError {
    match failure.status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => EchoError::Auth(failure.message),
        _ => failure.into_error(),
    }
}

impl SupabaseAuth {
    pub fn new(client: Supabase) -> Self {
        Self { client, events: AuthEvents::new() }
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> EchoResult<Session> {
        let resp = self
            .client
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(auth_error(Failure::read(resp).await));
        }
        Ok(resp.json::<TokenResponse>().await?.into())
    }

    fn install(&self, event: AuthEvent, session: Session) -> Session {
        self.client.set_session(Some(session.clone()));
        self.events.emit(event, Some(session.clone()));
        session
    }

    async fn refresh(&self, refresh_token: &str) -> EchoResult<Session> {
        let session = self
            .token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        tracing::debug!(user_id = %session.user.id, "access token refreshed");
        Ok(self.install(AuthEvent::TokenRefreshed, session))
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn get_session(&self) -> EchoResult<Option<Session>> {
        let Some(session) = self.client.session() else {
            return Ok(None);
        };

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let expiring = session
            .expires_at
            .is_some_and(|at| at - EXPIRY_MARGIN_SECS <= now);
        let (true, Some(refresh_token)) = (expiring, session.refresh_token.as_deref()) else {
            return Ok(Some(session));
        };

        match self.refresh(refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(err) if err.is_transient() => Err(err),
            Err(err) => {
                tracing::warn!(user_id = %session.user.id, "session could not be refreshed: {err}");
                self.client.set_session(None);
                self.events.emit(AuthEvent::SignedOut, None);
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> EchoResult<Session> {
        let session = self
            .token("password", json!({ "email": email, "password": password }))
            .await?;
        tracing::info!(user_id = %session.user.id, "signed in");
        Ok(self.install(AuthEvent::SignedIn, session))
    }

    async fn sign_up(&self, email: &str, password: &str) -> EchoResult<Identity> {
        let resp = self
            .client
            .request(Method::POST, "/auth/v1/signup")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(auth_error(Failure::read(resp).await));
        }
        match resp.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => {
                let session = self.install(AuthEvent::SignedIn, token.into());
                Ok(session.user)
            }
            SignUpResponse::User(user) => {
                tracing::info!(user_id = %user.id, "account awaits email confirmation");
                Ok(user)
            }
        }
    }

    async fn sign_out(&self) -> EchoResult<()> {
        if self.client.session().is_some() {
            let logout = self
                .client
                .request(Method::POST, "/auth/v1/logout")
                .send()
                .await;
            match logout {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => tracing::warn!("remote logout failed: {}", Failure::read(resp).await.message),
                Err(err) => tracing::warn!("remote logout failed: {err}"),
            }
        }

        self.client.set_session(None);
        self.events.emit(AuthEvent::SignedOut, None);
        Ok(())
    }
}
