//! Error types for the SevenTV API.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Field map attached to an error and rendered as `details`.
pub type ErrorFields = Map<String, Value>;

/// A human readable detail plus structured fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDetail {
    /// Detail message.
    pub message: String,
    /// Structured fields.
    pub fields: ErrorFields,
}

impl ErrorDetail {
    /// Create a detail with no fields.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: ErrorFields::new(),
        }
    }

    /// Attach a field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&str> for ErrorDetail {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ErrorDetail {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Kinds of entities that can be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Emote,
    EmoteSet,
    ActiveEmote,
    User,
    Role,
    Ban,
    Message,
    Report,
    Connection,
}

impl EntityKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Emote => "Emote",
            Self::EmoteSet => "Emote Set",
            Self::ActiveEmote => "Active Emote",
            Self::User => "User",
            Self::Role => "Role",
            Self::Ban => "Ban",
            Self::Message => "Message",
            Self::Report => "Report",
            Self::Connection => "Connection",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kinds of mutation pre-condition conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another active emote already uses the name.
    EmoteNameConflict,
    /// The emote is already active in the set.
    EmoteAlreadyEnabled,
    /// Generic conflict.
    Other,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmoteNameConflict => "Emote Name Conflict",
            Self::EmoteAlreadyEnabled => "Emote Already Enabled",
            Self::Other => "Conflict",
        })
    }
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("You are banned: {reason}")]
    Banned {
        reason: String,
        expire_at: DateTime<Utc>,
    },

    #[error("Insufficient Privilege: {0}")]
    InsufficientPrivilege(ErrorDetail),

    #[error("Bad Object ID: {0}")]
    BadObjectId(String),

    #[error("Invalid Request: {0}")]
    InvalidRequest(ErrorDetail),

    #[error("Unknown {kind}: {detail}")]
    UnknownEntity { kind: EntityKind, detail: ErrorDetail },

    #[error("{kind}: {detail}")]
    Conflict { kind: ConflictKind, detail: ErrorDetail },

    #[error("No Space Available: {0}")]
    NoSpaceAvailable(ErrorDetail),

    #[error("Rate Limit Reached")]
    RateLimited,

    #[error("End of Life: {0}")]
    EndOfLife(String),

    // === Server Errors ===
    #[error("Tainted Object")]
    TaintedObject,

    #[error("Missing Internal Dependency: {0}")]
    MissingInternalDependency(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for [`AppError::UnknownEntity`].
    pub fn unknown(kind: EntityKind, detail: impl Into<ErrorDetail>) -> Self {
        Self::UnknownEntity {
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for [`AppError::InsufficientPrivilege`].
    pub fn forbidden(detail: impl Into<ErrorDetail>) -> Self {
        Self::InsufficientPrivilege(detail.into())
    }

    /// Shorthand for [`AppError::InvalidRequest`].
    pub fn invalid(detail: impl Into<ErrorDetail>) -> Self {
        Self::InvalidRequest(detail.into())
    }

    /// Shorthand for [`AppError::Conflict`].
    pub fn conflict(kind: ConflictKind, detail: impl Into<ErrorDetail>) -> Self {
        Self::Conflict {
            kind,
            detail: detail.into(),
        }
    }

    /// Attach a field to errors that carry an [`ErrorDetail`]. Other variants are returned unchanged.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self {
            Self::InsufficientPrivilege(d)
            | Self::InvalidRequest(d)
            | Self::NoSpaceAvailable(d)
            | Self::UnknownEntity { detail: d, .. }
            | Self::Conflict { detail: d, .. } => {
                d.fields.insert(key.into(), value.into());
            }
            _ => {}
        }
        self
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::Unauthorized(_) | Self::Banned { .. } => StatusCode::UNAUTHORIZED,
            Self::InsufficientPrivilege(_) => StatusCode::FORBIDDEN,
            Self::BadObjectId(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownEntity { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } | Self::NoSpaceAvailable(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::EndOfLife(_) => StatusCode::GONE,

            // 5xx Server Errors
            Self::MissingInternalDependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::TaintedObject
            | Self::Database(_)
            | Self::Redis(_)
            | Self::Queue(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::ExternalService(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the numeric error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Unauthorized(_) => 70401,
            Self::Banned { .. } => 70402,
            Self::InsufficientPrivilege(_) => 70403,
            Self::EndOfLife(_) => 70410,
            Self::RateLimited => 70429,
            Self::BadObjectId(_) => 70440,
            Self::InvalidRequest(_) => 70441,
            Self::UnknownEntity { kind, .. } => match kind {
                EntityKind::Emote => 70442,
                EntityKind::EmoteSet => 70443,
                EntityKind::User => 70444,
                EntityKind::Role => 70445,
                EntityKind::Ban => 70446,
                EntityKind::Message => 70447,
                EntityKind::Report => 70448,
                EntityKind::Connection => 70449,
                EntityKind::ActiveEmote => 70450,
            },
            Self::Conflict { kind, .. } => match kind {
                ConflictKind::EmoteNameConflict => 70460,
                ConflictKind::EmoteAlreadyEnabled => 70461,
                ConflictKind::Other => 70463,
            },
            Self::NoSpaceAvailable(_) => 70462,
            Self::Internal(_) => 70500,
            Self::TaintedObject => 70501,
            Self::MissingInternalDependency(_) => 70503,
            Self::Database(_) => 70510,
            Self::Redis(_) => 70511,
            Self::Queue(_) => 70512,
            Self::Storage(_) => 70513,
            Self::Config(_) => 70514,
            Self::ExternalService(_) => 70515,
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Message safe to show to clients. Infrastructure failures are not revealed.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_)
            | Self::Redis(_)
            | Self::Queue(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::Internal(_)
            | Self::TaintedObject => "Internal Server Error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured details rendered in the response body.
    #[must_use]
    pub fn details(&self) -> Option<ErrorFields> {
        match self {
            Self::Banned { reason, expire_at } => {
                let mut fields = ErrorFields::new();
                fields.insert(
                    "ban".to_string(),
                    json!({
                        "reason": reason,
                        "expire_at": expire_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    }),
                );
                Some(fields)
            }
            Self::InsufficientPrivilege(d)
            | Self::InvalidRequest(d)
            | Self::NoSpaceAvailable(d)
            | Self::UnknownEntity { detail: d, .. }
            | Self::Conflict { detail: d, .. }
                if !d.fields.is_empty() =>
            {
                Some(d.fields.clone())
            }
            _ => None,
        }
    }

    /// Build the wire representation of this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let status = self.status_code();
        ErrorBody {
            status_code: status.as_u16(),
            status: status.canonical_reason().unwrap_or("Unknown").to_string(),
            error: self.public_message(),
            error_code: self.error_code(),
            details: self.details(),
        }
    }
}

/// JSON error body returned by every handler.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub status_code: u16,
    pub status: String,
    pub error: String,
    pub error_code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorFields>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        (status, Json(self.to_body())).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidRequest(ErrorDetail::new(err.to_string()))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::ExternalService(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::Unauthorized("Bad Token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::forbidden("Private Emote").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::unknown(EntityKind::Emote, "x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::NoSpaceAvailable("full".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::TaintedObject.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::MissingInternalDependency("mq".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::EndOfLife("v1".into()).status_code(), StatusCode::GONE);
    }

    #[test]
    fn test_fields_are_rendered_as_details() {
        let err = AppError::forbidden("Private Emote").with_field("EMOTE_ID", "abc");
        let body = err.to_body();

        assert_eq!(body.status_code, 403);
        assert_eq!(body.status, "Forbidden");
        assert_eq!(body.error, "Insufficient Privilege: Private Emote");
        assert_eq!(body.details.unwrap()["EMOTE_ID"], "abc");
    }

    #[test]
    fn test_banned_details_contain_reason() {
        let expire_at = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = AppError::Banned {
            reason: "spam".to_string(),
            expire_at,
        };
        let details = err.to_body().details.unwrap();

        assert_eq!(details["ban"]["reason"], "spam");
        assert_eq!(details["ban"]["expire_at"], "2030-01-01T00:00:00Z");
    }

    #[test]
    fn test_server_errors_hide_internals() {
        let err = AppError::Database("connection refused on 10.0.0.3".into());
        let body = err.to_body();

        assert_eq!(body.error, "Internal Server Error");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_with_field_ignores_variants_without_detail() {
        let err = AppError::RateLimited.with_field("X", 1);
        assert!(err.details().is_none());
    }
}
