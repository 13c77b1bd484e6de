use crate::api::models::ApiEnvelope;
use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed or missing input
    #[error("{message}")]
    Validation { message: String },

    /// Missing, invalid, expired or revoked credential; failed OTP
    #[error("Not authenticated")]
    Unauthorized { message: Option<String> },

    /// Caller is known but not allowed: no active role, role not held,
    /// switching to the currently-active role
    #[error("{message}")]
    Forbidden { message: String },

    /// Unknown account or entity
    #[error("{message}")]
    NotFound { message: String },

    /// Uniqueness violation, naming the colliding field
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// OTP attempt budget exhausted
    #[error("{message}")]
    RateLimited { message: String },

    /// OTP provider misbehavior or missing provider configuration
    #[error("Upstream failure: {operation}")]
    Upstream { operation: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::Unauthorized { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { message } => message.clone(),
            Error::NotFound { message } => message.clone(),
            Error::Conflict { message } => message.clone(),
            Error::RateLimited { message } => message.clone(),
            Error::Upstream { .. } => "Verification service is unavailable, please try again later".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => {
                    // Provide user-friendly messages for common unique constraint violations
                    match (table.as_deref(), constraint.as_deref()) {
                        (Some("users"), Some(c)) if c.contains("email") => "An account with this email already exists".to_string(),
                        (Some("users"), Some(c)) if c.contains("mobile") => {
                            "An account with this mobile number already exists".to_string()
                        }
                        (Some("users"), Some(c)) if c.contains("registration") => {
                            "An account with this registration number already exists".to_string()
                        }
                        _ => "Resource already exists".to_string(),
                    }
                }
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Upstream { .. } => {
                tracing::error!("Upstream provider error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Conflict { .. } | Error::RateLimited { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::Unauthorized { .. } | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Validation { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let envelope = ApiEnvelope::<serde_json::Value>::failure(self.user_message());

        (status, axum::response::Json(envelope)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
