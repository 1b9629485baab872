//! Error types and result aliases.
//!
//! The library distinguishes failures by the layer that produced them:
//!
//! - [`LedgerError`] - the remote ledger, its transport, or the signing wallet
//! - [`ContentError`] - the off-chain content store
//! - [`InvariantViolation`] - a mutation rejected client-side before submission
//! - [`LibraryError`] - the top-level error returned by [`LibraryService`](crate::LibraryService)
//! - [`ConfigError`] - configuration builder validation
//!
//! Content read failures never reach callers: the
//! [`ContentResolver`](crate::ContentResolver) converts them into
//! [`Resolution::Unavailable`](crate::Resolution::Unavailable) and the
//! reconciler counts them. Ledger failures always propagate.
//!
//! Every error here is `Clone` so that one single-flight outcome can be
//! handed to every caller that joined it.
//!
//! # Example
//!
//! ```
//! use shelfchain_library::{LedgerError, LibraryError};
//!
//! let err: LibraryError = LedgerError::UserRejected.into();
//! assert!(err.is_user_rejected());
//! ```

use thiserror::Error;

use crate::types::{Address, BookId};

/// Result type alias for ledger client operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result type alias for content store operations.
pub type ContentResult<T> = Result<T, ContentError>;

/// Result type alias for library operations.
pub type LibraryResult<T> = Result<T, LibraryError>;

/// Errors produced by a [`LedgerClient`](crate::LedgerClient).
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// No provider or signer is bound, or the provider dropped the connection.
    #[error("Ledger connection unavailable: {message}")]
    ConnectionUnavailable {
        /// Description of why the connection is unavailable.
        message: String,
    },

    /// The account holder declined to sign the transaction.
    #[error("Signature rejected by account holder")]
    UserRejected,

    /// The ledger refused to execute the operation.
    ///
    /// Typical causes are an insufficient role, no copies left to borrow,
    /// or outstanding loans on delete.
    #[error("Execution reverted: {reason}")]
    Reverted {
        /// Revert reason reported by the ledger.
        reason: String,
    },

    /// A read targeted a record the ledger does not hold.
    #[error("Not found on ledger: {what}")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },

    /// Network or protocol failure talking to the ledger endpoint.
    #[error("Ledger transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// A request or a confirmation wait exceeded its time limit.
    #[error("Ledger operation timed out")]
    Timeout,

    /// The ledger answered with a payload that could not be decoded.
    #[error("Malformed ledger response: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },
}

impl LedgerError {
    /// Creates a new `ConnectionUnavailable` error.
    #[must_use]
    pub fn connection_unavailable(message: impl Into<String>) -> Self {
        Self::ConnectionUnavailable { message: message.into() }
    }

    /// Creates a new `Reverted` error.
    #[must_use]
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted { reason: reason.into() }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }

    /// Returns `true` for failures that may succeed when retried unchanged.
    ///
    /// Only reads are ever retried; a write is never resubmitted
    /// automatically regardless of this flag.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout)
    }
}

/// Errors produced by a [`ContentStore`](crate::ContentStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ContentError {
    /// The document could not be fetched.
    #[error("Content unavailable at {uri}: {message}")]
    Unavailable {
        /// URI that was requested.
        uri: String,
        /// Description of the fetch failure.
        message: String,
    },

    /// The document was fetched but is not a valid metadata document.
    #[error("Content at {uri} could not be parsed: {message}")]
    Parse {
        /// URI that was requested.
        uri: String,
        /// Description of the parse failure.
        message: String,
    },

    /// The URI uses a scheme the store cannot resolve.
    #[error("Unsupported content URI: {uri}")]
    InvalidUri {
        /// The rejected URI.
        uri: String,
    },

    /// Publishing (pinning) a document or file failed.
    #[error("Content publish failed: {message}")]
    Publish {
        /// Description of the publish failure.
        message: String,
    },
}

impl ContentError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable { uri: uri.into(), message: message.into() }
    }

    /// Creates a new `Parse` error.
    #[must_use]
    pub fn parse(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse { uri: uri.into(), message: message.into() }
    }

    /// Creates a new `Publish` error.
    #[must_use]
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish { message: message.into() }
    }
}

/// A mutation that would break a copy-count or loan invariant.
///
/// These are detected client-side before anything is submitted, so no
/// signature prompt is shown for a request the ledger would revert anyway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InvariantViolation {
    /// Every copy of the book is on loan.
    #[error("No copies of book {book_id} are available")]
    NoCopiesAvailable {
        /// Book that was requested.
        book_id: BookId,
    },

    /// The caller already holds a copy of the book.
    #[error("{borrower} has already borrowed book {book_id}")]
    AlreadyBorrowed {
        /// Book that was requested.
        book_id: BookId,
        /// Address that already holds a copy.
        borrower: Address,
    },

    /// The caller does not hold a copy of the book.
    #[error("{borrower} has not borrowed book {book_id}")]
    NotBorrowed {
        /// Book that was being returned.
        book_id: BookId,
        /// Address that attempted the return.
        borrower: Address,
    },

    /// The new quantity is smaller than the number of copies on loan.
    #[error("Cannot reduce book {book_id} to {requested} copies while {borrowed} are borrowed")]
    QuantityBelowBorrowed {
        /// Book being updated.
        book_id: BookId,
        /// Requested total quantity.
        requested: u64,
        /// Copies currently on loan.
        borrowed: u64,
    },

    /// The book cannot be deleted while copies are on loan.
    #[error("Cannot delete book {book_id} while {outstanding} copies are borrowed")]
    OutstandingLoans {
        /// Book being deleted.
        book_id: BookId,
        /// Copies currently on loan.
        outstanding: u64,
    },
}

/// Top-level error returned by library operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LibraryError {
    /// Failure reported by the ledger client.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Failure publishing to the content store.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Mutation rejected before submission.
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    /// The ledger holds no book with this id.
    #[error("Book not found: {id}")]
    BookNotFound {
        /// Requested book id.
        id: BookId,
    },

    /// The book exists but lacks a required field after reconciliation.
    #[error("Book {id} is missing required fields")]
    RecordIncomplete {
        /// Book id of the incomplete record.
        id: BookId,
    },
}

impl LibraryError {
    /// Returns `true` if the account holder declined to sign.
    #[must_use]
    pub fn is_user_rejected(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::UserRejected))
    }

    /// Returns `true` if the ledger reverted the operation.
    #[must_use]
    pub fn is_reverted(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::Reverted { .. }))
    }

    /// Returns `true` if no signer or provider was bound.
    #[must_use]
    pub fn is_connection_unavailable(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::ConnectionUnavailable { .. }))
    }

    /// Returns the invariant violation, if this error is one.
    #[must_use]
    pub fn as_invariant(&self) -> Option<&InvariantViolation> {
        match self {
            Self::Invariant(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric field is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Rendered minimum.
        min: String,
        /// Rendered value.
        value: String,
    },

    /// A duration or count must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// Name of the offending field.
        field: &'static str,
        /// Rendered value.
        value: String,
    },

    /// A field holds a value that cannot be used.
    #[error("{field} is invalid: {message}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}
