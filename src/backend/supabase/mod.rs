//! Hosted backend speaking the Supabase REST surfaces: GoTrue for auth,
//! PostgREST for rows and Storage for media.

mod auth;
mod rest;
mod storage;

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::{Method, RequestBuilder, Response, StatusCode};

pub use auth::SupabaseAuth;
pub use rest::RestGateway;
pub use storage::SupabaseStorage;

use crate::{
    error::{EchoError, EchoResult},
    model::Session,
};

/// PostgREST's code for "the single-object request matched no row".
const NOT_FOUND_CODE: &str = "PGRST116";
const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Connection shared by the auth, rest and storage halves. The session
/// obtained by [`SupabaseAuth`] authorizes the other two.
#[derive(Clone)]
pub struct Supabase {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl Supabase {
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            anon_key: anon_key.to_owned(),
            session: Arc::default(),
        }
    }

    pub fn auth(&self) -> SupabaseAuth {
        SupabaseAuth::new(self.clone())
    }

    pub fn gateway(&self) -> RestGateway {
        RestGateway::new(self.clone())
    }

    pub fn storage(&self, bucket: &str) -> SupabaseStorage {
        SupabaseStorage::new(self.clone(), bucket)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// A request carrying the project key and the user's token (or the key
    /// itself when signed out).
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .session()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone());

        self.http
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

/// The error body of a failed call, as far as it could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    status: StatusCode,
    code: Option<String>,
    message: String,
}

impl Failure {
    async fn read(resp: Response) -> Self {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Self::parse(status, &body)
    }

    /// Understands both PostgREST (`code`, `message`) and GoTrue
    /// (`error_code`/`msg`, or `error`/`error_description`) bodies.
    fn parse(status: StatusCode, body: &str) -> Self {
        let json: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
        let text = |key: &str| json.get(key).and_then(|v| v.as_str()).map(str::to_owned);

        let code = text("code").or_else(|| text("error_code")).or_else(|| text("error"));
        let message = text("message")
            .or_else(|| text("msg"))
            .or_else(|| text("error_description"))
            .unwrap_or_else(|| {
                if body.is_empty() { status.to_string() } else { body.to_owned() }
            });

        Self { status, code, message }
    }

    fn is_not_found(&self) -> bool {
        self.code.as_deref() == Some(NOT_FOUND_CODE)
    }

    fn into_error(self) -> EchoError {
        if self.status == StatusCode::CONFLICT || self.code.as_deref() == Some(UNIQUE_VIOLATION_CODE) {
            return EchoError::Conflict(self.message);
        }
        match self.status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EchoError::Unauthenticated,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                EchoError::Validation(self.message)
            }
            status => EchoError::Transient(format!("{status}: {}", self.message)),
        }
    }
}

/// Passes successful responses through and turns the rest into [`EchoError`]s.
async fn check(resp: Response) -> EchoResult<Response> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(Failure::read(resp).await.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_postgrest_bodies() {
        let failure = Failure::parse(
            StatusCode::NOT_ACCEPTABLE,
            r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#,
        );
        assert!(failure.is_not_found());
        assert!(failure.into_error().is_transient());
    }

    #[test]
    fn unique_violations_are_conflicts() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint \"profiles_username_key\""}"#;
        assert!(matches!(
            Failure::parse(StatusCode::CONFLICT, body).into_error(),
            EchoError::Conflict(msg) if msg.contains("profiles_username_key")
        ));
    }

    #[test]
    fn reads_gotrue_bodies() {
        let failure = Failure::parse(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert_eq!(failure.code.as_deref(), Some("invalid_credentials"));
        assert_eq!(failure.message, "Invalid login credentials");

        let legacy = Failure::parse(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(legacy.message, "Invalid login credentials");
    }

    #[test]
    fn status_decides_the_rest() {
        assert_eq!(Failure::parse(StatusCode::UNAUTHORIZED, "").into_error(), EchoError::Unauthenticated);
        assert_eq!(
            Failure::parse(StatusCode::BAD_GATEWAY, "upstream died").into_error(),
            EchoError::Transient("502 Bad Gateway: upstream died".into())
        );
    }
}
