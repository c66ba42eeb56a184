use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    engagement::{ToggleError, ToggleRejected},
    error::EchoError,
    media::MediaRejection,
};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<EchoError>() {
            return echo_status(err);
        }
        if let Some(err) = self.0.downcast_ref::<ToggleError>() {
            return match err {
                ToggleError::Rejected(ToggleRejected::SignedOut) => StatusCode::UNAUTHORIZED,
                ToggleError::Rejected(ToggleRejected::Unknown) => StatusCode::NOT_FOUND,
                ToggleError::Rejected(_) => StatusCode::CONFLICT,
                ToggleError::Commit(err) => echo_status(err),
                ToggleError::Detached(_) => StatusCode::CONFLICT,
            };
        }
        if let Some(err) = self.0.downcast_ref::<MediaRejection>() {
            return match err {
                MediaRejection::WrongType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                MediaRejection::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                MediaRejection::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            };
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn echo_status(err: &EchoError) -> StatusCode {
    match err {
        EchoError::Validation(_) => StatusCode::BAD_REQUEST,
        EchoError::Conflict(_) => StatusCode::CONFLICT,
        EchoError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        EchoError::Unauthenticated | EchoError::Auth(_) => StatusCode::UNAUTHORIZED,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{:#}", self.0);
        } else {
            tracing::debug!(%status, "{:#}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LikeState;

    #[test]
    fn maps_errors_to_statuses() {
        let status = |err: AppError| err.status();

        assert_eq!(status(EchoError::validation("x").into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(EchoError::Conflict("taken".into()).into()), StatusCode::CONFLICT);
        assert_eq!(status(EchoError::transient("down").into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(EchoError::Unauthenticated.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(ToggleError::Rejected(ToggleRejected::Pending).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(status(ToggleError::Detached(LikeState::Liked).into()), StatusCode::CONFLICT);
        assert_eq!(status(MediaRejection::TooLarge.into()), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status(anyhow::anyhow!("boom").into()), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
