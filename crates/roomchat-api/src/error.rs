use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use roomchat_core::ChatError;
use roomchat_types::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("token could not be issued")]
    Token(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Chat(ChatError::DuplicateUsername) => StatusCode::CONFLICT,
            Self::Chat(ChatError::InvalidCredentials) | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::Chat(ChatError::RoomNotFound) => StatusCode::NOT_FOUND,
            Self::Chat(ChatError::NotAMember) => StatusCode::FORBIDDEN,
            Self::Chat(ChatError::CodeSpaceExhausted(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Chat(ChatError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::Chat(ChatError::Storage(_)) | Self::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Chat(ChatError::Storage(e)) | Self::Token(e) => {
                error!("Request failed: {:#}", e);
                "internal error".to_string()
            }
            Self::Chat(ChatError::CodeSpaceExhausted(_)) => {
                "no room codes available, try again".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ChatError::DuplicateUsername, StatusCode::CONFLICT),
            (ChatError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ChatError::RoomNotFound, StatusCode::NOT_FOUND),
            (ChatError::NotAMember, StatusCode::FORBIDDEN),
            (ChatError::CodeSpaceExhausted(16), StatusCode::SERVICE_UNAVAILABLE),
            (ChatError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (ChatError::Storage(anyhow::anyhow!("disk full")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
