//! Error types for Wallarm API operations.
//!
//! Responses are classified exactly once, in the transport. Every variant that
//! carries an HTTP status keeps the status code and the raw response body
//! verbatim so failures can be matched against the service's own error format.

use thiserror::Error;

/// Main error type for Wallarm API operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Connection, DNS, TLS or body-read failure
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The service is rate limiting the client (HTTP 429)
    #[error("HTTP Status: {status}, Body: {body}")]
    RateLimited {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Server-side failure (HTTP 5xx, including 522-524)
    #[error("HTTP Status: {status}, Body: {body}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Credentials were rejected (HTTP 401/403)
    #[error("HTTP Status: {status}, Body: {body}")]
    Auth {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The resource was created earlier, outside of this client
    #[error("This resource has already been created earlier: HTTP Status: {status} Body: {body}")]
    AlreadyExists {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Resource not found (HTTP 404)
    #[error("HTTP Status: {status}, Body: {body}")]
    NotFound {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Any other non-2xx response
    #[error("HTTP Status: {status}, Body: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// A successful response carried a body that could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// A request payload could not be serialized
    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// A match condition or point violates its tag's key arity
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// A rule identity string could not be parsed
    #[error("Invalid rule identity: {0}")]
    InvalidIdentity(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The caller's deadline elapsed
    #[error("Deadline exceeded: {0}")]
    Timeout(String),
}

/// Specialized result type for Wallarm API operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_FAILURE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::ServerError { .. } => "SERVER_ERROR",
            Self::Auth { .. } => "AUTH_ERROR",
            Self::AlreadyExists { .. } => "DUPLICATE_RESOURCE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Encode(_) => "ENCODE_ERROR",
            Self::InvalidCondition(_) => "INVALID_CONDITION",
            Self::InvalidIdentity(_) => "INVALID_IDENTITY",
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::Cancelled(_) => "CANCELLED",
            Self::Timeout(_) => "TIMEOUT",
        }
    }

    /// Returns true for failures the transport retries with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::ServerError { .. }
        )
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. }
            | Self::ServerError { status, .. }
            | Self::Auth { status, .. }
            | Self::AlreadyExists { status, .. }
            | Self::NotFound { status, .. }
            | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body carried by this error, if any.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::RateLimited { body, .. }
            | Self::ServerError { body, .. }
            | Self::Auth { body, .. }
            | Self::AlreadyExists { body, .. }
            | Self::NotFound { body, .. }
            | Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Returns true if the error reports a resource that already exists.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if the error reports a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}
