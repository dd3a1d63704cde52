//! Error types for calls against the compute API.

use thiserror::Error;

/// Errors surfaced by [`super::ComputeApi`] implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the addressed resource does not exist (HTTP 404).
    #[error("{resource} not found")]
    NotFound {
        /// Resource path or name that was requested.
        resource: String,
    },
    /// Raised when the platform rejects a mutation as conflicting with an
    /// existing resource (HTTP 409).
    #[error("conflict: {message}")]
    Conflict {
        /// Message returned by the platform.
        message: String,
    },
    /// Raised for any other non-success HTTP status.
    #[error("{endpoint} returned {status}: {message}")]
    Http {
        /// Method and path of the failed request.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },
    /// Raised when the request could not be sent or the response not read.
    #[error("transport error: {message}")]
    Transport {
        /// Message from the HTTP client.
        message: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode {endpoint} response: {message}")]
    Decode {
        /// Method and path of the request.
        endpoint: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when the request cannot be signed.
    #[error("failed to sign request: {message}")]
    Signing {
        /// Underlying error message.
        message: String,
    },
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}
