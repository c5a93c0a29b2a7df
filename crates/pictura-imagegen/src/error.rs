use std::fmt;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use pictura_core::{StoreError, TransitionError};
use pictura_ratelimit::RateLimitError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageGenError>;

/// Image generation errors
#[derive(Debug, Error)]
pub enum ImageGenError {
    /// Missing or unsupported provider, missing credential, bad configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Prompt rejected before any backend call
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    /// Option value rejected before any backend call
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Backend call failed; the generation record is already marked failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Local rate limit reached; nothing was dispatched
    #[error("{message}")]
    RateLimitExceeded { message: String, retry_after: u64 },

    /// Record store, blob store or counter store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Credential rejected
    Unauthorized,
    /// Account out of credit or quota
    InsufficientFunds,
    /// Backend throttled the request
    RateLimited,
    /// Backend rejected the request body
    MalformedRequest,
    /// Anything else, including transport failures and timeouts
    Backend,
}

/// Normalized backend failure
#[derive(Debug, Clone, Error)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// HTTP status, absent for transport failures
    pub status: Option<u16>,
    /// Parsed error body, when the backend sent JSON
    pub payload: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl ImageGenError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPrompt(_) | Self::InvalidOptions(_) => StatusCode::BAD_REQUEST,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Api(api) => match api.kind {
                ApiErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ApiErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
                ApiErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ApiErrorKind::MalformedRequest => StatusCode::BAD_REQUEST,
                ApiErrorKind::Backend => StatusCode::BAD_GATEWAY,
            },
            Self::Configuration(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error type string for the response body
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::InvalidPrompt(_) | Self::InvalidOptions(_) => "invalid_request_error",
            Self::Api(_) => "api_error",
            Self::RateLimitExceeded { .. } => "rate_limit_error",
            Self::Storage(_) => "internal_error",
        }
    }

    /// Seconds to wait before retrying, for local rate limit rejections
    pub const fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Message that is safe to expose to API consumers
    pub fn client_message(&self) -> String {
        match self {
            Self::Storage(_) => "Internal server error".to_owned(),
            _ => self.to_string(),
        }
    }
}

impl From<StoreError> for ImageGenError {
    fn from(error: StoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<TransitionError> for ImageGenError {
    fn from(error: TransitionError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<RateLimitError> for ImageGenError {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::Exceeded { retry_after, .. } => Self::RateLimitExceeded {
                message: error.to_string(),
                retry_after,
            },
            other => Self::Storage(other.to_string()),
        }
    }
}

/// `{ "error": { "message", "type", "code" } }`
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: &'static str,
    code: u16,
}

/// Render an error body outside the [`ImageGenError`] taxonomy
pub(crate) fn error_response(status: StatusCode, error_type: &'static str, message: String) -> Response {
    let body = ErrorResponse {
        error: ErrorDetails {
            message,
            r#type: error_type,
            code: status.as_u16(),
        },
    };

    (status, Json(body)).into_response()
}

impl IntoResponse for ImageGenError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = error_response(status, self.error_type(), self.client_message());

        if let Some(seconds) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}
