//! The [`LedgerClient`] trait.
//!
//! A ledger client is the only component that talks to the authoritative
//! ledger. Reads return raw, unmerged records; reconciliation happens in
//! [`reconcile`](crate::reconcile). Writes take the signing address and
//! resolve only after the ledger has confirmed the transaction.
//!
//! # Implementations
//!
//! | Client | Use Case |
//! |--------|----------|
//! | [`MemoryLedger`](crate::MemoryLedger) | Testing, development |
//! | `RpcLedger` (in `shelfchain-ledger`) | JSON-RPC endpoint |

use async_trait::async_trait;

use crate::{
    error::LedgerResult,
    types::{Address, BookId, LedgerBook, LedgerLogEntry, TxReceipt},
};

/// Read and write access to the library ledger.
///
/// # Errors
///
/// Every method reports failures as [`LedgerError`](crate::LedgerError).
/// Writes surface [`UserRejected`](crate::LedgerError::UserRejected) when
/// the signer declines and [`Reverted`](crate::LedgerError::Reverted) when
/// the ledger refuses execution. A write error is never swallowed.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Establishes the connection if it is not already established.
    ///
    /// Repeated calls on a connected client are no-ops. Every other method
    /// connects lazily, so calling this up front is optional.
    async fn connect(&self) -> LedgerResult<()> {
        Ok(())
    }

    // ---- reads ----

    /// Lists every book record.
    async fn get_books(&self) -> LedgerResult<Vec<LedgerBook>>;

    /// Fetches one book record.
    ///
    /// Returns [`NotFound`](crate::LedgerError::NotFound) if no book has `id`.
    async fn get_book(&self, id: &BookId) -> LedgerResult<LedgerBook>;

    /// Lists every borrow log entry.
    async fn get_borrow_history(&self) -> LedgerResult<Vec<LedgerLogEntry>>;

    /// Lists the borrow log entries of one borrower.
    async fn get_user_borrow_history(&self, borrower: &Address)
    -> LedgerResult<Vec<LedgerLogEntry>>;

    /// Returns `true` if `address` holds the admin role.
    async fn is_admin(&self, address: &Address) -> LedgerResult<bool>;

    /// Returns `true` if `address` is a registered user.
    async fn is_user(&self, address: &Address) -> LedgerResult<bool>;

    /// Returns the super admin fixed at deployment.
    async fn get_super_admin(&self) -> LedgerResult<Address>;

    /// Lists every admin.
    async fn get_all_admins(&self) -> LedgerResult<Vec<Address>>;

    /// Lists every registered user.
    async fn get_all_users(&self) -> LedgerResult<Vec<Address>>;

    // ---- writes ----

    /// Adds a book; the ledger assigns its id.
    async fn add_book(
        &self,
        signer: &Address,
        metadata_uri: &str,
        quantity: u64,
    ) -> LedgerResult<TxReceipt>;

    /// Replaces a book's metadata pointer and total quantity.
    async fn update_book(
        &self,
        signer: &Address,
        id: &BookId,
        metadata_uri: &str,
        quantity: u64,
    ) -> LedgerResult<TxReceipt>;

    /// Deletes a book.
    async fn delete_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt>;

    /// Borrows one copy of a book for the signer.
    async fn borrow_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt>;

    /// Returns the signer's copy of a book.
    async fn return_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt>;

    /// Registers the signer as a user.
    async fn register(&self, signer: &Address) -> LedgerResult<TxReceipt>;

    /// Grants the user role to `address`.
    async fn add_user(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt>;

    /// Revokes the user role from `address`.
    async fn remove_user(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt>;

    /// Grants the admin role to `address`.
    async fn make_admin(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt>;

    /// Revokes the admin role from `address`.
    async fn remove_admin(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt>;
}
