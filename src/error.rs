//! Error taxonomy and the failure policy of every core operation.

use std::fmt;

use thiserror::Error;

pub type EchoResult<T> = Result<T, EchoError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EchoError {
    /// Caller-side contract violation. Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Uniqueness violation reported by the store, e.g. a taken username.
    #[error("{0}")]
    Conflict(String),

    /// Network or service failure on an otherwise valid request.
    #[error("service unavailable: {0}")]
    Transient(String),

    /// The operation needs a signed-in identity and there is none.
    #[error("not signed in")]
    Unauthenticated,

    /// The auth provider rejected the request (bad credentials, weak password...).
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl EchoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self::Transient(err.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for EchoError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

impl From<sqlx::Error> for EchoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_owned())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() || db.is_check_violation() => {
                Self::Validation(db.message().to_owned())
            }
            _ => Self::Transient(err.to_string()),
        }
    }
}

/// What a component does with a failure at its own boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Log and degrade to an empty/default/previous result.
    FailSoft,
    /// Return the error to presentation and roll back local changes.
    FailHard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    InitialSession,
    AuthEvent,
    RefreshSession,
    CreatePost,
    ListFeed,
    ToggleLike,
    GetProfile,
    WriteProfile,
    TrendingHashtags,
    TopNews,
    UploadMedia,
}

/// Per-operation failure policy. Components hand their failures to
/// [`absorb`] instead of deciding on their own.
pub const fn policy(op: Operation) -> Policy {
    use Operation::*;
    match op {
        InitialSession | AuthEvent | RefreshSession | TrendingHashtags | TopNews => Policy::FailSoft,
        CreatePost | ListFeed | ToggleLike | GetProfile | WriteProfile | UploadMedia => {
            Policy::FailHard
        }
    }
}

/// Applies `op`'s policy to its outcome. A fail-soft failure is logged and
/// becomes `Ok(None)`; a fail-hard one is handed back.
pub fn absorb<T, E: fmt::Display>(op: Operation, result: Result<T, E>) -> Result<Option<T>, E> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => match policy(op) {
            Policy::FailSoft => {
                tracing::warn!(?op, "degrading after failure: {err}");
                Ok(None)
            }
            Policy::FailHard => Err(err),
        },
    }
}
