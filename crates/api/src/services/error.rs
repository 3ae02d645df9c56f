use afscheid_auth::AuthError;

use crate::storage::StorageError;
use crate::ApiError;

#[derive(Debug)]
pub enum ServiceError {
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
    Conflict(String),
    PayloadTooLarge(String),
    Database(sqlx::Error),
    Auth(AuthError),
    Storage(StorageError),
    Internal(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::PayloadTooLarge(msg)
            | Self::Internal(msg) => f.write_str(msg),
            Self::Database(err) => write!(f, "database error: {err}"),
            Self::Auth(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::PayloadTooLarge(msg) => ApiError::payload_too_large(msg),
            ServiceError::Database(db_err) => {
                tracing::error!(error = %db_err, "database error");
                ApiError::internal_server_error("database operation failed")
            }
            ServiceError::Auth(auth_err) => ApiError::from(auth_err),
            ServiceError::Storage(storage_err) => ApiError::from(storage_err),
            ServiceError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ApiError::internal_server_error(msg)
            }
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

/// True when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}
