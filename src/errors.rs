use http::StatusCode;
use serde::Deserialize;

use crate::cache::CacheError;

/// Body shape the backend uses for rejections; every field is optional because
/// older endpoints answer with plain text.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error")]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A mutation for the same record is still in flight.
    #[error("Record {0} is busy")]
    Busy(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Backend returned {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("Store error: {0}")]
    Store(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

impl ServiceError {
    /// Builds the error for a non-2xx backend answer, keeping the server text so
    /// conflicts can be shown verbatim.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message.or(b.detail))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    trimmed.to_string()
                }
            });

        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::FORBIDDEN => Self::Forbidden(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            _ => Self::Http { status, message },
        }
    }

    /// Returns the HTTP status this error corresponds to.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            Self::Forbidden(_) => Some(StatusCode::FORBIDDEN),
            Self::NotFound(_) => Some(StatusCode::NOT_FOUND),
            Self::Conflict(_) => Some(StatusCode::CONFLICT),
            Self::Http { status, .. } => Some(*status),
            Self::ValidationError(_)
            | Self::Busy(_)
            | Self::Transport(_)
            | Self::Decode(_)
            | Self::Store(_)
            | Self::Config(_)
            | Self::InternalError(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Forbidden(_))
    }

    /// Message suitable for a toast. Conflicts and validation problems are shown
    /// verbatim; internal failures get a generic text.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized(_) => "Your session has expired. Sign in again.".to_string(),
            Self::Forbidden(_) => "You do not have permission to perform this action.".to_string(),
            Self::NotFound(_) => "The record no longer exists; the list was refreshed.".to_string(),
            Self::Conflict(msg) => msg.clone(),
            Self::ValidationError(msg) => msg.clone(),
            Self::Busy(_) => "Wait for the previous operation on this record to finish.".to_string(),
            Self::Transport(_) => "Could not reach the server. Check your connection.".to_string(),
            Self::Decode(_) | Self::Http { .. } => "The server returned an unexpected response.".to_string(),
            Self::Store(_) | Self::Config(_) | Self::InternalError(_) => {
                "Internal error".to_string()
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
