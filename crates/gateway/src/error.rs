//! Errors returned by the gateway Admin API.
//!
//! The reconciler treats these as opaque except for their category: a
//! missing entity and a conflict are distinguished from transport and server
//! failures so callers can decide what to report and what is safe to retry.

use entitystore::Kind;
use thiserror::Error;

/// Categories of Admin API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The entity does not exist
    NotFound,
    /// Unique or foreign-key constraint violated on the gateway
    Conflict,
    /// Connection, DNS, or timeout failure (transient)
    Network,
    /// 5xx response (transient)
    Server,
    /// Other 4xx response, e.g. schema violation
    Client,
    /// Response body could not be understood
    Decode,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Whether this category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Server)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Entity not found",
            Self::Conflict => "Constraint violation",
            Self::Network => "Network connectivity issue",
            Self::Server => "Gateway server error",
            Self::Client => "Request rejected",
            Self::Decode => "Unexpected response",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while talking to the Admin API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The entity does not exist on the gateway
    #[error("{kind} {id} not found on the gateway")]
    NotFound { kind: Kind, id: String },

    /// The gateway refused the change because of a constraint
    #[error("conflict on {kind}: {message}")]
    Conflict { kind: Kind, message: String },

    /// Any other non-success HTTP status
    #[error("HTTP {status} on {kind}: {message}")]
    Status {
        kind: Kind,
        status: u16,
        message: String,
    },

    /// The request never produced a response
    #[error("network error: {message}")]
    Network { message: String },

    /// The response could not be decoded
    #[error("cannot decode {kind} response: {message}")]
    Decode { kind: Kind, message: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Status { status, .. } if *status >= 500 => ErrorCategory::Server,
            Self::Status { .. } => ErrorCategory::Client,
            Self::Network { .. } => ErrorCategory::Network,
            Self::Decode { .. } => ErrorCategory::Decode,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Map an HTTP status and response body to an error.
    pub fn from_status(kind: Kind, id: &str, status: u16, body: &str) -> Self {
        let message = response_message(body);
        match status {
            404 => Self::NotFound {
                kind,
                id: id.to_string(),
            },
            409 => Self::Conflict { kind, message },
            _ => Self::Status {
                kind,
                status,
                message,
            },
        }
    }
}

/// The `message` field of a JSON error body, else the raw body.
fn response_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for Admin API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
