//! # Error Types
//!
//! Domain error enum shared across the workspace. Handler code maps these
//! into the `{code, msg, data}` response envelope; everything below the web
//! layer propagates them with `?`.

use thiserror::Error;

/// Result alias used throughout the workspace
pub type CascadeResult<T> = Result<T, CascadeError>;

/// Errors surfaced by the cascade engine
#[derive(Debug, Error)]
pub enum CascadeError {
    /// Graph or payload content failed semantic validation (cycles,
    /// self-loops, cross-stage edges, missing entities). The message names
    /// the offending entity.
    #[error("{0}")]
    Validation(String),

    /// An edit touched a frozen field of a materialized entity
    #[error("{0}")]
    EditRestricted(String),

    /// A precondition or state guard failed (wrong task status, cursor
    /// mismatch, missing comment, non-owner resubmit)
    #[error("{0}")]
    InvalidState(String),

    /// The referenced entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// The request carried no usable caller identity
    #[error("caller identity required: {0}")]
    Unauthorized(String),

    /// A database operation failed
    #[error("database error during {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// The apply-id generator refused to issue an id
    #[error("id generation failed: {reason}")]
    IdGeneration { reason: String },

    /// Configuration could not be loaded or was invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl CascadeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn edit_restricted(message: impl Into<String>) -> Self {
        Self::EditRestricted(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Wrap a sqlx error with the name of the failing operation
    pub fn database(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            operation: operation.into(),
            source,
        }
    }
}

impl axum::response::IntoResponse for CascadeError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::Json;

        let (status, msg) = match &self {
            CascadeError::Validation(message)
            | CascadeError::EditRestricted(message)
            | CascadeError::InvalidState(message)
            | CascadeError::NotFound(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            }
            CascadeError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, message.clone())
            }
            CascadeError::Database { .. } => {
                tracing::error!(error = %self, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            CascadeError::IdGeneration { .. } | CascadeError::Config(_) => {
                tracing::error!(error = %self, "infrastructure error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "code": status.as_u16(),
            "msg": msg,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_passes_through_unchanged() {
        let err = CascadeError::validation("stage 'S1' cannot precede itself");
        assert_eq!(err.to_string(), "stage 'S1' cannot precede itself");
    }

    #[test]
    fn database_error_names_the_operation() {
        let err = CascadeError::database("load_project_plan", sqlx::Error::PoolClosed);
        assert!(err.to_string().contains("load_project_plan"));
    }
}
