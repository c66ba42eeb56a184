//! Auth provider contract and the sign-up flow built on top of it.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{
    error::{EchoError, EchoResult},
    gateway::Gateway,
    model::{Identity, Profile, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

pub type AuthChange = (AuthEvent, Option<Session>);

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The session the provider currently holds, if any.
    async fn get_session(&self) -> EchoResult<Option<Session>>;

    /// Auth-state transitions from now on. Dropping the subscription unsubscribes.
    fn subscribe(&self) -> AuthSubscription;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> EchoResult<Session>;

    async fn sign_up(&self, email: &str, password: &str) -> EchoResult<Identity>;

    async fn sign_out(&self) -> EchoResult<()>;
}

/// Fan-out of auth-state transitions, shared by the provider implementations.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthChange>,
}

impl AuthEvents {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(16).0,
        }
    }

    pub fn emit(&self, event: AuthEvent, session: Option<Session>) {
        tracing::debug!(?event, signed_in = session.is_some(), "auth state change");
        // no subscribers is fine
        let _ = self.tx.send((event, session));
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthChange>,
}

impl AuthSubscription {
    /// Next transition, or `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<AuthChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                // every change overwrites the last one, so skipped changes are harmless
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub username: String,
    pub full_name: String,
}

/// Creates the account, then its profile. A profile failure signs the fresh
/// account back out and returns the profile error.
pub async fn sign_up(
    auth: &dyn AuthProvider,
    gateway: &dyn Gateway,
    form: SignUpForm,
) -> EchoResult<Profile> {
    if form.username.trim().is_empty() || form.full_name.trim().is_empty() {
        return Err(EchoError::validation("username and full name are required"));
    }

    let identity = auth.sign_up(&form.email, &form.password).await?;
    tracing::info!(user_id = %identity.id, username = %form.username, "account created");

    let profile = Profile {
        id: identity.id,
        username: form.username,
        full_name: form.full_name,
        bio: None,
        avatar_url: None,
    };

    match gateway.create_profile(profile).await {
        Ok(profile) => Ok(profile),
        Err(err) => {
            tracing::warn!(user_id = %identity.id, "profile creation failed: {err}");
            if let Err(sign_out_err) = auth.sign_out().await {
                tracing::warn!("sign out after failed sign up: {sign_out_err}");
            }
            Err(err)
        }
    }
}
