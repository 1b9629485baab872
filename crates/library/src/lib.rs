//! Reconciliation and access control between a library ledger and a
//! content store.
//!
//! The ledger is authoritative for books, copy counts, loans and roles. The
//! content store holds each book's metadata document and cover image. This
//! crate merges the two into one consistent view, checks copy-count
//! invariants before anything is signed, guards writes against duplicate
//! submission, and caches the role registry for authorization gating.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Presentation Layer                        │
//! │            (pages, forms, notifications)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    LibraryService                           │
//! │   pre-checks │ Reconciler │ RoleAuthority │ History         │
//! ├──────────────┴─────────────┬───────────────┴────────────────┤
//! │   TransactionOrchestrator  │        ContentResolver         │
//! │     (single-flight)        │                                │
//! ├────────────────────────────┼────────────────────────────────┤
//! │      LedgerClient trait    │       ContentStore trait       │
//! ├──────────────┬─────────────┼───────────────┬────────────────┤
//! │ MemoryLedger │  RpcLedger  │ MemoryContent │ HttpContent    │
//! │  (testing)   │ (JSON-RPC)  │   (testing)   │ (IPFS gateway) │
//! └──────────────┴─────────────┴───────────────┴────────────────┘
//! ```
//!
//! `RpcLedger` lives in `shelfchain-ledger` and `HttpContentStore` in
//! `shelfchain-content`.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use shelfchain_library::{
//!     Address, BookDraft, CoverSource, LibraryConfig, LibraryService, MemoryContentStore,
//!     MemoryLedger, MockWallet, Session,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let owner = Address::parse("0xowner");
//!     let service = LibraryService::new(
//!         Arc::new(MemoryLedger::new(owner.clone())),
//!         Arc::new(MemoryContentStore::new()),
//!         LibraryConfig::default(),
//!     );
//!
//!     let session = Session::new(Arc::new(MockWallet::new(vec![owner], "0x1")));
//!     session.connect().await?;
//!
//!     let draft = BookDraft::builder()
//!         .title("Dune")
//!         .author("Frank Herbert")
//!         .quantity(2)
//!         .cover(CoverSource::Uri("https://covers.example/dune.png".into()))
//!         .build();
//!     service.add_book(&session, draft).await?;
//!
//!     let report = service.get_books().await?;
//!     assert_eq!(report.books[0].title, "Dune");
//!     assert_eq!(report.books[0].available_copies, 2);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Library operations return [`LibraryResult<T>`]. Ledger failures always
//! propagate; content read failures are absorbed by the reconciler and
//! counted in [`BatchReport`].
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with shared fixtures (a service over in-memory
//!   doubles, sessions per role, assertion helpers). Enable this in `[dev-dependencies]` for
//!   integration tests.

#![deny(unsafe_code)]

pub mod config;
pub mod content;
pub mod error;
pub mod history;
pub mod ledger;
pub mod memory;
pub mod orchestrator;
pub mod reconcile;
pub mod roles;
pub mod service;
pub mod session;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic, missing_docs)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use config::LibraryConfig;
pub use content::{ContentResolver, ContentStore, Resolution};
pub use error::{
    ConfigError, ContentError, ContentResult, InvariantViolation, LedgerError, LedgerResult,
    LibraryError, LibraryResult,
};
pub use history::{ActivityStats, activity_stats, compose_history, filter_by_borrower};
pub use ledger::LedgerClient;
pub use memory::{MemoryContentStore, MemoryLedger, MockWallet};
pub use orchestrator::{FlightKey, Retention, TransactionOrchestrator};
pub use reconcile::{BatchReport, Reconciler, merge};
pub use roles::{Permissions, RoleAuthority, RoleSnapshot, Tier};
pub use service::{LibraryService, Registration};
pub use session::{Account, IdentityChange, Session, WalletEvent, WalletProvider};
pub use types::{
    Address, Book, BookDocument, BookDraft, BookId, BorrowHistory, Borrower, CoverSource,
    LedgerBook, LedgerLogEntry, TxHash, TxReceipt,
};
