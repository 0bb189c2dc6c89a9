use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use livelab_protocol::{ErrorCode, ServerMessage};
use serde_json::json;
use thiserror::Error;

use crate::hub::{AdmissionError, LockError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    BadRequest(String),

    #[error("Signaling hub is not running")]
    HubUnavailable,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::HubUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised while the hub handles one client event.
///
/// Each is reported only to the connection that caused it.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HubError {
    #[error("identify first")]
    NotIdentified,

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("not allowed: {0}")]
    Unauthorized(String),

    #[error("chat message longer than {max} characters")]
    ChatTooLong { max: usize },

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl HubError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HubError::NotIdentified => ErrorCode::NotIdentified,
            HubError::UnknownRoom(_) => ErrorCode::UnknownRoom,
            HubError::Admission(e) => e.code(),
            HubError::Lock(_) => ErrorCode::LockConflict,
            HubError::Unauthorized(_) => ErrorCode::Unauthorized,
            HubError::ChatTooLong { .. } => ErrorCode::ChatTooLong,
            HubError::InvalidMessage(_) => ErrorCode::InvalidMessage,
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_hub_error_codes() {
        assert_eq!(
            HubError::from(AdmissionError::RoomFull { max: 3 }).code(),
            ErrorCode::RoomFull
        );
        assert_eq!(
            HubError::from(LockError::Conflict {
                holder: Uuid::nil()
            })
            .code(),
            ErrorCode::LockConflict
        );
        match (HubError::ChatTooLong { max: 5 }).to_message() {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, ErrorCode::ChatTooLong);
                assert!(message.contains('5'));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_app_error_status() {
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::HubUnavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
