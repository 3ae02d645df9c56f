use afscheid_assistant::AssistantError;
use afscheid_auth::AuthError;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::storage::StorageError;

/// Body of every failed response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            success: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        error!(error = ?error, "internal error");
        Self::internal_server_error("internal server error")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        let status = error.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::payload_too_large("file exceeds the upload limit");
        }
        Self::new(status, error.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let status = match error {
            AuthError::InvalidCredentials
            | AuthError::SessionNotFound
            | AuthError::SessionExpired
            | AuthError::InvalidSession => StatusCode::UNAUTHORIZED,
            AuthError::UserExists => StatusCode::CONFLICT,
            AuthError::InvalidEmail
            | AuthError::WeakPassword
            | AuthError::MissingName
            | AuthError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Database(_) | AuthError::PasswordHash(_) => {
                error!(error = ?error, "auth error");
                return Self::internal_server_error("authentication backend failure");
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<AssistantError> for ApiError {
    fn from(error: AssistantError) -> Self {
        let status = match error {
            AssistantError::ApiKeyMissing => StatusCode::SERVICE_UNAVAILABLE,
            AssistantError::InvalidConversation(_) => StatusCode::BAD_REQUEST,
            AssistantError::Http(_)
            | AssistantError::Upstream { .. }
            | AssistantError::InvalidResponse(_)
            | AssistantError::EmptyResponse => {
                warn!(error = ?error, "assistant upstream failure");
                return Self::new(StatusCode::BAD_GATEWAY, "assistant service unavailable");
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(_) => Self::not_found("file not found"),
            StorageError::InvalidPath(_) => Self::bad_request(error.to_string()),
            StorageError::Io(_) => {
                error!(error = ?error, "storage error");
                Self::internal_server_error("storage failure")
            }
        }
    }
}
