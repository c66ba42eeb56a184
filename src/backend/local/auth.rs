use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::{AuthEvent, AuthEvents, AuthProvider, AuthSubscription},
    error::{EchoError, EchoResult},
    model::{Identity, Session},
};

use super::parse_id;

const MIN_PASSWORD_CHARS: usize = 6;
/// bcrypt ignores everything past 72 bytes.
const MAX_PASSWORD_BYTES: usize = 72;

/// Email/password accounts kept next to the rest of the local data.
pub struct LocalAuth {
    db_pool: SqlitePool,
    events: AuthEvents,
    current: Mutex<Option<Session>>,
    cost: u32,
}

async fn hash_password(password: &str, cost: u32) -> EchoResult<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(EchoError::transient)?
        .map_err(EchoError::transient)
}

async fn verify_password(password: &str, hash: &str) -> EchoResult<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(EchoError::transient)?
        .map_err(EchoError::transient)
}

impl LocalAuth {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            events: AuthEvents::new(),
            current: Mutex::new(None),
            cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Overrides the bcrypt cost factor, e.g. to keep tests fast.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    fn replace_current(&self, session: Option<Session>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn open_session(&self, user: Identity) -> Session {
        let session = Session {
            access_token: hex::encode(rand::random::<[u8; 32]>()),
            refresh_token: None,
            expires_at: None,
            user,
        };
        self.replace_current(Some(session.clone()));
        self.events.emit(AuthEvent::SignedIn, Some(session.clone()));
        session
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn get_session(&self) -> EchoResult<Option<Session>> {
        Ok(self.current.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> EchoResult<Session> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id,password_hash FROM accounts WHERE email=?")
                .bind(email.trim().to_lowercase())
                .fetch_optional(&self.db_pool)
                .await?;

        let Some((id, password_hash)) = row else {
            return Err(EchoError::Auth("Invalid login credentials".into()));
        };
        if !verify_password(password, &password_hash).await? {
            return Err(EchoError::Auth("Invalid login credentials".into()));
        }

        let user = Identity { id: parse_id(&id)?, email: email.trim().to_lowercase() };
        tracing::info!(user_id = %user.id, "signed in");
        Ok(self.open_session(user))
    }

    async fn sign_up(&self, email: &str, password: &str) -> EchoResult<Identity> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(EchoError::Auth("Unable to validate email address: invalid format".into()));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(EchoError::Auth(format!(
                "Password should be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(EchoError::Auth(format!(
                "Password should be at most {MAX_PASSWORD_BYTES} bytes"
            )));
        }

        let user = Identity { id: Uuid::new_v4(), email };
        let password_hash = hash_password(password, self.cost).await?;

        sqlx::query("INSERT INTO accounts (id,email,password_hash) VALUES (?,?,?)")
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(&password_hash)
            .execute(&self.db_pool)
            .await
            .map_err(|e| match EchoError::from(e) {
                EchoError::Conflict(_) => EchoError::Auth("User already registered".into()),
                other => other,
            })?;

        self.open_session(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> EchoResult<()> {
        self.replace_current(None);
        self.events.emit(AuthEvent::SignedOut, None);
        Ok(())
    }
}
