//! JSON-RPC error types and their mapping onto [`LedgerError`].
//!
//! The wallet-provider conventions decide most of the mapping:
//!
//! | Code                       | [`LedgerError`]            |
//! |----------------------------|----------------------------|
//! | `4001`                     | `UserRejected`             |
//! | `4100`, `4900`, `4901`     | `ConnectionUnavailable`    |
//! | `3`, `-32000` + "revert"   | `Reverted`                 |
//! | `-32004`, "not found"      | `NotFound`                 |
//! | anything else              | `Transport`                |
//!
//! HTTP timeouts become `Timeout`; undecodable payloads become `Decode`.

use serde::Deserialize;
use shelfchain_library::LedgerError;
use thiserror::Error;

/// User declined the request.
pub const CODE_USER_REJECTED: i64 = 4001;
/// The requested account or method is not authorized.
pub const CODE_UNAUTHORIZED: i64 = 4100;
/// The provider is disconnected from all chains.
pub const CODE_DISCONNECTED: i64 = 4900;
/// The provider is not connected to the requested chain.
pub const CODE_CHAIN_DISCONNECTED: i64 = 4901;
/// Execution reverted.
pub const CODE_EXECUTION_REVERTED: i64 = 3;
/// Generic server error, used by several nodes for reverts.
pub const CODE_SERVER_ERROR: i64 = -32000;
/// Resource not found.
pub const CODE_RESOURCE_NOT_FOUND: i64 = -32004;

const REVERT_PREFIX: &str = "execution reverted:";

/// Result type alias for raw RPC exchanges.
pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Optional payload; revert reasons often travel here.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Failures of a single JSON-RPC exchange.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// The server answered with a JSON-RPC error object.
    #[error("JSON-RPC error {}: {}", .0.code, .0.message)]
    Remote(RpcErrorObject),

    /// The request did not complete.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Description of the failure.
        message: String,
        /// Whether the failure was a timeout.
        timed_out: bool,
    },

    /// The server answered with a non-success HTTP status.
    #[error("HTTP status {status}")]
    Status {
        /// The status code.
        status: u16,
    },

    /// The response body was not a valid JSON-RPC response.
    #[error("malformed JSON-RPC response: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

impl RpcError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed { message: message.into() }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::malformed(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Status { status: status.as_u16() };
        }
        Self::Http { message: err.to_string(), timed_out: err.is_timeout() }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}

fn revert_reason(object: &RpcErrorObject) -> String {
    if let Some(serde_json::Value::String(reason)) = &object.data
        && !reason.starts_with("0x")
    {
        return reason.clone();
    }
    let message = object.message.trim();
    match message.get(..REVERT_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(REVERT_PREFIX) => {
            message[REVERT_PREFIX.len()..].trim().to_owned()
        },
        _ => message.to_owned(),
    }
}

impl From<RpcErrorObject> for LedgerError {
    fn from(object: RpcErrorObject) -> Self {
        let lowered = object.message.to_lowercase();
        match object.code {
            CODE_USER_REJECTED => Self::UserRejected,
            CODE_UNAUTHORIZED | CODE_DISCONNECTED | CODE_CHAIN_DISCONNECTED => {
                Self::connection_unavailable(object.message)
            },
            CODE_EXECUTION_REVERTED => Self::reverted(revert_reason(&object)),
            CODE_SERVER_ERROR if lowered.contains("revert") => {
                Self::reverted(revert_reason(&object))
            },
            CODE_RESOURCE_NOT_FOUND => Self::not_found(object.message),
            _ if lowered.contains("not found") => Self::not_found(object.message),
            code => Self::transport(format!("JSON-RPC error {code}: {}", object.message)),
        }
    }
}

impl From<RpcError> for LedgerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote(object) => object.into(),
            RpcError::Http { timed_out: true, .. } => Self::Timeout,
            RpcError::Http { message, .. } => Self::transport(message),
            RpcError::Status { status } => Self::transport(format!("HTTP status {status}")),
            RpcError::Malformed { message } => Self::decode(message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn object(code: i64, message: &str) -> RpcErrorObject {
        RpcErrorObject { code, message: message.into(), data: None }
    }

    #[rstest]
    #[case(4001, "User denied transaction signature", LedgerError::UserRejected)]
    #[case(4100, "Unauthorized", LedgerError::connection_unavailable("Unauthorized"))]
    #[case(4900, "Disconnected", LedgerError::connection_unavailable("Disconnected"))]
    #[case(4901, "Chain disconnected", LedgerError::connection_unavailable("Chain disconnected"))]
    #[case(3, "execution reverted: No copies available", LedgerError::reverted("No copies available"))]
    #[case(-32000, "Execution Reverted: Caller is not an admin", LedgerError::reverted("Caller is not an admin"))]
    #[case(-32004, "book 9", LedgerError::not_found("book 9"))]
    #[case(-32603, "Book not found", LedgerError::not_found("Book not found"))]
    #[case(-32000, "nonce too low", LedgerError::transport("JSON-RPC error -32000: nonce too low"))]
    #[case(-32601, "method missing", LedgerError::transport("JSON-RPC error -32601: method missing"))]
    fn test_code_mapping(#[case] code: i64, #[case] message: &str, #[case] expected: LedgerError) {
        assert_eq!(LedgerError::from(object(code, message)), expected);
    }

    #[test]
    fn test_revert_reason_prefers_readable_data() {
        let err = RpcErrorObject {
            code: 3,
            message: "execution reverted".into(),
            data: Some(json!("You haven't borrowed this book")),
        };
        assert_eq!(LedgerError::from(err), LedgerError::reverted("You haven't borrowed this book"));

        let encoded = RpcErrorObject {
            code: 3,
            message: "execution reverted: Cannot remove the super admin".into(),
            data: Some(json!("0x08c379a0")),
        };
        assert_eq!(
            LedgerError::from(encoded),
            LedgerError::reverted("Cannot remove the super admin")
        );
    }

    #[rstest]
    #[case(RpcError::Http { message: "timed out".into(), timed_out: true }, LedgerError::Timeout)]
    #[case(RpcError::Http { message: "reset".into(), timed_out: false }, LedgerError::transport("reset"))]
    #[case(RpcError::Status { status: 502 }, LedgerError::transport("HTTP status 502"))]
    #[case(RpcError::malformed("eof"), LedgerError::decode("eof"))]
    fn test_transport_mapping(#[case] err: RpcError, #[case] expected: LedgerError) {
        assert_eq!(LedgerError::from(err), expected);
    }

    #[test]
    fn test_transient_classification_survives_mapping() {
        let timeout = LedgerError::from(RpcError::Http { message: String::new(), timed_out: true });
        assert!(timeout.is_transient());
        assert!(!LedgerError::from(object(4001, "")).is_transient());
    }
}
