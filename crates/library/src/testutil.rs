//! Shared test utilities for library testing.
//!
//! This module provides fixtures for building a [`LibraryService`] over the
//! in-memory doubles, canned addresses and drafts, and assertion helpers for
//! [`LibraryResult`] values. It is feature-gated behind `testutil` to prevent
//! leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! shelfchain-library = { path = "../library", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use shelfchain_library::testutil::{Fixture, sample_draft};
//! ```

use std::sync::Arc;

use crate::{
    config::LibraryConfig,
    error::{InvariantViolation, LibraryError, LibraryResult},
    ledger::LedgerClient,
    memory::{MemoryContentStore, MemoryLedger, MockWallet},
    service::LibraryService,
    session::Session,
    types::{Address, BookDraft, BookId, CoverSource, LedgerBook, TxReceipt},
};

/// Chain id reported by fixture wallets.
pub const TEST_CHAIN_ID: &str = "0x7a69";

/// The super admin of fixture ledgers.
#[must_use]
pub fn owner() -> Address {
    Address::parse("0x00000000000000000000000000000000000000aa")
}

/// An admin seeded into fixture ledgers.
#[must_use]
pub fn admin() -> Address {
    Address::parse("0x00000000000000000000000000000000000000bb")
}

/// A registered user seeded into fixture ledgers.
#[must_use]
pub fn reader() -> Address {
    Address::parse("0x00000000000000000000000000000000000000cc")
}

/// An address that is not registered.
#[must_use]
pub fn newcomer() -> Address {
    Address::parse("0x00000000000000000000000000000000000000dd")
}

/// A draft with a pre-published cover.
#[must_use]
pub fn sample_draft(title: &str, quantity: u64) -> BookDraft {
    BookDraft::builder()
        .title(title)
        .author("Test Author")
        .description(format!("About {title}"))
        .isbn("978-0-00-000000-0")
        .genre("Fiction")
        .quantity(quantity)
        .cover(CoverSource::Uri(format!("https://covers.test/{}.png", title.to_lowercase())))
        .build()
}

/// A raw ledger record with the given counts.
#[must_use]
pub fn ledger_book(id: &str, metadata_uri: &str, quantity: u64, available: u64) -> LedgerBook {
    LedgerBook {
        id: BookId::from(id),
        metadata_uri: Some(metadata_uri.to_owned()),
        quantity: Some(quantity),
        available: Some(available),
        ..LedgerBook::default()
    }
}

/// A session connected through its own [`MockWallet`].
///
/// # Panics
///
/// Panics if the mock wallet refuses to connect (it never does unless told to).
pub async fn connected_session(address: Address) -> (Arc<MockWallet>, Session) {
    let wallet = Arc::new(MockWallet::new(vec![address], TEST_CHAIN_ID));
    let session = Session::new(Arc::clone(&wallet) as Arc<dyn crate::WalletProvider>);
    session.connect().await.expect("mock wallet connect failed");
    (wallet, session)
}

/// A service over in-memory doubles with one session per role.
pub struct Fixture {
    pub ledger: MemoryLedger,
    pub content: Arc<MemoryContentStore>,
    pub service: LibraryService,
    pub owner_session: Session,
    pub admin_session: Session,
    pub reader_session: Session,
    pub reader_wallet: Arc<MockWallet>,
    pub newcomer_session: Session,
    pub newcomer_wallet: Arc<MockWallet>,
}

impl Fixture {
    /// Builds the fixture with default configuration.
    pub async fn new() -> Self {
        Self::with_config(LibraryConfig::default()).await
    }

    /// Builds the fixture with `config`.
    ///
    /// # Panics
    ///
    /// Panics if a mock wallet fails to connect.
    pub async fn with_config(config: LibraryConfig) -> Self {
        let ledger = MemoryLedger::new(owner());
        ledger.seed_admin(admin());
        ledger.seed_user(reader());
        let content = Arc::new(MemoryContentStore::new());
        let service = LibraryService::new(
            Arc::new(ledger.clone()),
            Arc::clone(&content) as Arc<dyn crate::ContentStore>,
            config,
        );

        let (_, owner_session) = connected_session(owner()).await;
        let (_, admin_session) = connected_session(admin()).await;
        let (reader_wallet, reader_session) = connected_session(reader()).await;
        let (newcomer_wallet, newcomer_session) = connected_session(newcomer()).await;

        Self {
            ledger,
            content,
            service,
            owner_session,
            admin_session,
            reader_session,
            reader_wallet,
            newcomer_session,
            newcomer_wallet,
        }
    }

    /// Adds a book through the service as the owner and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if the book cannot be added.
    pub async fn add_book(&self, title: &str, quantity: u64) -> BookId {
        self.service
            .add_book(&self.owner_session, sample_draft(title, quantity))
            .await
            .expect("add_book failed");
        let books = self.ledger.get_books().await.expect("get_books failed");
        books.last().map(|b| b.id.clone()).expect("ledger holds no books")
    }
}

/// Assert that a [`LibraryResult`] is a specific [`InvariantViolation`] kind.
///
/// # Panics
///
/// Panics if the result is `Ok` or a different error.
#[track_caller]
pub fn assert_invariant<T: std::fmt::Debug>(
    result: LibraryResult<T>,
    check: impl FnOnce(&InvariantViolation) -> bool,
) {
    match result {
        Err(LibraryError::Invariant(violation)) if check(&violation) => {},
        other => panic!("expected invariant violation, got {other:?}"),
    }
}

/// Assert that a [`LibraryResult`] is a ledger revert.
///
/// # Panics
///
/// Panics if the result is not a revert.
#[track_caller]
pub fn assert_reverted(result: LibraryResult<TxReceipt>) {
    match result {
        Err(err) if err.is_reverted() => {},
        other => panic!("expected revert, got {other:?}"),
    }
}
