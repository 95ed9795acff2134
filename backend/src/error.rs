use crate::chain::ChainError;
use crate::database::DatabaseError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sqlx::Error as SqlxError;
use thiserror::Error;
use tracing::error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("{0}")]
    Validation(String),

    /// Duplicate account or record
    #[error("{0}")]
    Conflict(String),

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Unauthorized access errors
    #[error("{0}")]
    Unauthorized(String),

    /// Blockchain errors
    #[error("Blockchain error: {0}")]
    Chain(#[from] ChainError),

    /// AI engine or other upstream failures
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Session token error: {0}")]
    SessionToken(#[from] jsonwebtoken::errors::Error),

    /// Malformed JSON payloads and audit records
    #[error("Invalid payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UUID parsing errors
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Chain failures the caller can fix by changing the request
    fn is_client_chain_error(err: &ChainError) -> bool {
        matches!(
            err,
            ChainError::InvalidAddress(_)
                | ChainError::NotApproved { .. }
                | ChainError::NotOwner { .. }
                | ChainError::TokenNotFound(_)
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Unauthorized(_) => 401,
            AppError::Validation(_)
            | AppError::Conflict(_)
            | AppError::InvalidUuid(_)
            | AppError::Serialization(_) => 400,
            AppError::Chain(err) if Self::is_client_chain_error(err) => 400,
            AppError::Chain(_) | AppError::ExternalService(_) => 502,
            _ => 500,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Internal details stay in the logs
        let message = if status.is_server_error() && !matches!(self, AppError::Chain(_)) {
            error!("Request failed: {:?}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::Conflict(msg),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            RepositoryError::InvalidInput(msg) => AppError::Validation(msg),
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                if code.as_deref() == Some("23505") {
                    // Unique violation
                    RepositoryError::Duplicate(db_err.message().to_string())
                } else if code.as_deref() == Some("23503") || code.as_deref() == Some("23514") {
                    // Foreign key / check constraint violation
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else {
                    RepositoryError::Query(err)
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::Conflict("x".into()).status_code(), 400);
        assert_eq!(AppError::ExternalService("x".into()).status_code(), 502);
        assert_eq!(AppError::Message("x".into()).status_code(), 500);
        assert_eq!(
            AppError::Chain(ChainError::InvalidAddress("0x1".into())).status_code(),
            400
        );
    }

    #[test]
    fn test_duplicate_maps_to_conflict() {
        let err: AppError = RepositoryError::Duplicate("users_username_key".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: RepositoryError = SqlxError::RowNotFound.into();
        let app: AppError = err.into();
        assert!(app.is_not_found());
    }

    #[test]
    fn test_chain_errors_split_by_cause() {
        assert_eq!(AppError::Chain(ChainError::TokenNotFound(7)).status_code(), 400);
        assert_eq!(
            AppError::Chain(ChainError::MissingSigner).status_code(),
            502
        );
    }

    #[test]
    fn test_bad_payload_is_client_error() {
        let err: AppError = serde_json::from_str::<u8>("\"x\"").unwrap_err().into();
        assert_eq!(err.status_code(), 400);
    }
}
