//! Error types for PledgeHub services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::SqlErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,
    InvalidSlug,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidCredentials,
    ExpiredToken,

    // Authorization errors (3xxx)
    Forbidden,
    TenantSuspended,

    // Resource errors (4xxx)
    NotFound,
    TenantNotFound,
    ProjectNotFound,
    ContributionNotFound,
    ApplicationNotFound,

    // Conflict / state errors (5xxx)
    Conflict,
    DuplicateSlug,
    DuplicateEmail,
    InvalidTransition,
    GuardFailed,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::InvalidSlug => 1004,

            // Auth (2xxx)
            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidCredentials => 2002,
            ErrorCode::ExpiredToken => 2003,

            // Authz (3xxx)
            ErrorCode::Forbidden => 3001,
            ErrorCode::TenantSuspended => 3003,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::TenantNotFound => 4002,
            ErrorCode::ProjectNotFound => 4003,
            ErrorCode::ContributionNotFound => 4004,
            ErrorCode::ApplicationNotFound => 4005,

            // Conflicts (5xxx)
            ErrorCode::Conflict => 5001,
            ErrorCode::DuplicateSlug => 5002,
            ErrorCode::DuplicateEmail => 5003,
            ErrorCode::InvalidTransition => 5004,
            ErrorCode::GuardFailed => 5005,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Invalid tenant slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Token expired")]
    ExpiredToken,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },


    #[error("Tenant is suspended: {slug}")]
    TenantSuspended { slug: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Tenant not found: {slug}")]
    TenantNotFound { slug: String },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Contribution not found: {id}")]
    ContributionNotFound { id: String },

    #[error("Tenant application not found: {id}")]
    ApplicationNotFound { id: String },

    // Conflict / state errors
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Tenant slug already taken: {slug}")]
    DuplicateSlug { slug: String },

    #[error("Email already registered: {email}")]
    DuplicateEmail { email: String },

    #[error("Cannot transition {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Precondition failed: {message}")]
    GuardFailed { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
        }
    }

    /// Shorthand for a guard failure
    pub fn guard(message: impl Into<String>) -> Self {
        AppError::GuardFailed {
            message: message.into(),
        }
    }

    /// Shorthand for a validation error on a single field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::InvalidSlug { .. } => ErrorCode::InvalidSlug,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::TenantSuspended { .. } => ErrorCode::TenantSuspended,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::TenantNotFound { .. } => ErrorCode::TenantNotFound,
            AppError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            AppError::ContributionNotFound { .. } => ErrorCode::ContributionNotFound,
            AppError::ApplicationNotFound { .. } => ErrorCode::ApplicationNotFound,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::DuplicateSlug { .. } => ErrorCode::DuplicateSlug,
            AppError::DuplicateEmail { .. } => ErrorCode::DuplicateEmail,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::GuardFailed { .. } => ErrorCode::GuardFailed,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 422 Unprocessable Entity
            AppError::Validation { .. }
            | AppError::InvalidSlug { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 401 Unauthorized
            AppError::Unauthorized { .. }
            | AppError::InvalidCredentials
            | AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. }
            | AppError::TenantSuspended { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::TenantNotFound { .. }
            | AppError::ProjectNotFound { .. }
            | AppError::ContributionNotFound { .. }
            | AppError::ApplicationNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict { .. }
            | AppError::DuplicateSlug { .. }
            | AppError::DuplicateEmail { .. }
            | AppError::InvalidTransition { .. }
            | AppError::GuardFailed { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::DatabaseConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            AppError::InvalidTransition { from, to, .. } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        // Never leak driver details to clients
        let message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            _ => message,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        err.sql_err()
            .and_then(|sql_err| constraint_conflict(&sql_err))
            .unwrap_or(AppError::Database(err))
    }
}

/// Unique violations come from racing writers and are reported as conflicts
fn constraint_conflict(err: &SqlErr) -> Option<AppError> {
    match err {
        SqlErr::UniqueConstraintViolation(detail) => {
            tracing::debug!(detail = %detail, "Unique constraint violated");
            Some(AppError::Conflict {
                message: "a conflicting record already exists".to_string(),
            })
        }
        _ => None,
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ProjectNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::ProjectNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code().as_code(), 4003);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::invalid_field("total_amount", "must be positive");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
        assert_eq!(
            err.details(),
            Some(serde_json::json!({ "field": "total_amount" }))
        );
    }

    #[test]
    fn test_transition_is_conflict() {
        let err = AppError::InvalidTransition {
            entity: "project",
            from: "completed".into(),
            to: "active".into(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            err.to_string(),
            "Cannot transition project from completed to active"
        );
    }

    #[test]
    fn test_server_error() {
        let err = AppError::Internal {
            message: "Something went wrong".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_suspended_tenant_is_forbidden() {
        let err = AppError::TenantSuspended { slug: "acme".into() };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), ErrorCode::TenantSuspended);
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let violation = SqlErr::UniqueConstraintViolation(
            "duplicate key value violates unique constraint \"users_email_key\"".into(),
        );
        let err = constraint_conflict(&violation).unwrap();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert!(!err.to_string().contains("users_email_key"));

        let foreign_key = SqlErr::ForeignKeyConstraintViolation("projects_tenant_id_fkey".into());
        assert!(constraint_conflict(&foreign_key).is_none());
    }

    #[test]
    fn test_other_database_errors_stay_internal() {
        let err = AppError::from(sea_orm::DbErr::Custom("boom".into()));
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
