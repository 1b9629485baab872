//! HTTP content store error types.
//!
//! [`HttpContentError`] captures what went wrong on the wire. It is
//! converted into [`ContentError`] at the [`ContentStore`] boundary, with
//! the requested URI attached for fetches.
//!
//! [`ContentStore`]: shelfchain_library::ContentStore

use shelfchain_library::ContentError;
use thiserror::Error;

/// Failures talking to the gateway or the pinning API.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HttpContentError {
    /// The request could not be sent or the response body not read.
    #[error("Request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
        /// Whether the request exceeded its timeout.
        timed_out: bool,
    },

    /// The server answered with a non-success status.
    #[error("HTTP status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The pinning API answered with an unexpected body.
    #[error("Unexpected pinning response: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    /// The URI scheme is neither `ipfs` nor `http(s)`.
    #[error("Unsupported content URI: {uri}")]
    UnsupportedUri {
        /// The rejected URI.
        uri: String,
    },
}

impl From<reqwest::Error> for HttpContentError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status { status: status.as_u16() };
        }
        if err.is_decode() {
            return Self::Decode { message: err.to_string() };
        }
        Self::Request { message: err.to_string(), timed_out: err.is_timeout() }
    }
}

impl HttpContentError {
    /// Converts a fetch failure for `uri`.
    #[must_use]
    pub fn into_fetch_error(self, uri: &str) -> ContentError {
        match self {
            Self::UnsupportedUri { uri } => ContentError::InvalidUri { uri },
            other => ContentError::unavailable(uri, other.to_string()),
        }
    }

    /// Converts a publish failure.
    #[must_use]
    pub fn into_publish_error(self) -> ContentError {
        ContentError::publish(self.to_string())
    }
}

/// Result type alias for HTTP content operations.
pub type HttpResult<T> = Result<T, HttpContentError>;
