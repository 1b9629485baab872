//! Client-facing library operations.
//!
//! [`LibraryService`] ties the components together:
//!
//! ```text
//! reads:   get_books ──► LedgerClient ──► Reconciler (ContentResolver) ──► BatchReport
//!          get_borrow_history ──► LedgerClient + get_books ──► compose_history
//!
//! writes:  borrow_book ──► pre-check ──► TransactionOrchestrator ──► LedgerClient
//!          add_book ──► ContentStore publish ──► TransactionOrchestrator ──► LedgerClient
//! ```
//!
//! Nothing is cached across calls except the role snapshot. After a write
//! confirms, callers re-fetch whatever they display.

use std::{future::Future, sync::Arc};

use bytes::Bytes;

use crate::{
    config::LibraryConfig,
    content::{ContentResolver, ContentStore},
    error::{
        ContentError, InvariantViolation, LedgerError, LedgerResult, LibraryError, LibraryResult,
    },
    history::{compose_history, filter_by_borrower},
    ledger::LedgerClient,
    orchestrator::{FlightKey, Retention, TransactionOrchestrator},
    reconcile::{BatchReport, Reconciler},
    roles::{Permissions, RoleAuthority, RoleSnapshot, Tier},
    session::{IdentityChange, Session, WalletEvent},
    types::{
        Address, Book, BookDocument, BookDraft, BookId, BorrowHistory, CoverSource, LedgerBook,
        TxReceipt,
    },
};

/// Outcome of [`LibraryService::ensure_registered`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The account was already a registered user; nothing was submitted.
    AlreadyRegistered,
    /// A registration transaction confirmed.
    Registered(TxReceipt),
}

/// The library façade used by the presentation layer.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use shelfchain_library::{
///     Address, LibraryConfig, LibraryService, MemoryContentStore, MemoryLedger, MockWallet,
///     Session,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let reader = Address::parse("0xreader");
///     let ledger = Arc::new(MemoryLedger::new(Address::parse("0xowner")));
///     let service = LibraryService::new(
///         ledger,
///         Arc::new(MemoryContentStore::new()),
///         LibraryConfig::default(),
///     );
///
///     let session = Session::new(Arc::new(MockWallet::new(vec![reader], "0x1")));
///     session.connect().await?;
///     service.ensure_registered(&session).await?;
///
///     let report = service.get_books().await?;
///     assert!(report.books.is_empty());
///     Ok(())
/// }
/// ```
pub struct LibraryService {
    ledger: Arc<dyn LedgerClient>,
    content: Arc<dyn ContentStore>,
    reconciler: Reconciler,
    roles: RoleAuthority,
    orchestrator: TransactionOrchestrator,
}

impl LibraryService {
    /// Creates a service over a ledger client and a content store.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        content: Arc<dyn ContentStore>,
        config: LibraryConfig,
    ) -> Self {
        let reconciler = Reconciler::new(
            ContentResolver::new(Arc::clone(&content)),
            config.fetch_concurrency(),
        );
        let roles = RoleAuthority::new(Arc::clone(&ledger), config.role_cache_ttl());
        Self { ledger, content, reconciler, roles, orchestrator: TransactionOrchestrator::new() }
    }

    /// The underlying ledger client.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// The transaction orchestrator guarding writes.
    #[must_use]
    pub fn orchestrator(&self) -> &TransactionOrchestrator {
        &self.orchestrator
    }

    // ---- books ----

    /// Lists every book, reconciled with its metadata.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the book list cannot be read. Content
    /// failures are counted in the report instead.
    #[tracing::instrument(skip(self))]
    pub async fn get_books(&self) -> LibraryResult<BatchReport> {
        let records = self.ledger.get_books().await?;
        Ok(self.reconciler.merge_all(records).await)
    }

    /// Fetches one reconciled book.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::BookNotFound`] if the ledger has no such book
    /// and [`LibraryError::RecordIncomplete`] if it lacks required fields.
    #[tracing::instrument(skip(self), fields(book_id = %id))]
    pub async fn get_book(&self, id: &BookId) -> LibraryResult<Book> {
        let record = self.ledger_book(id).await?;
        self.reconciler.merge_one(record).await
    }

    /// Borrows one copy for the session's account.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::NoCopiesAvailable`] or
    /// [`InvariantViolation::AlreadyBorrowed`] before submitting, and any
    /// ledger error from the submission.
    #[tracing::instrument(skip(self, session), fields(book_id = %id))]
    pub async fn borrow_book(&self, session: &Session, id: &BookId) -> LibraryResult<TxReceipt> {
        let signer = session.signer()?;
        let record = self.ledger_book(id).await?;
        if self.reconciler.counts(&record).await.available == 0 {
            return Err(InvariantViolation::NoCopiesAvailable { book_id: id.clone() }.into());
        }
        if record.borrowers.iter().any(|b| b.address == signer) {
            return Err(InvariantViolation::AlreadyBorrowed { book_id: id.clone(), borrower: signer }
                .into());
        }

        let id = id.clone();
        self.submit(&signer, format!("borrow:{id}"), move |ledger, signer| async move {
            ledger.borrow_book(&signer, &id).await
        })
        .await
    }

    /// Returns the session account's copy.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::NotBorrowed`] before submitting if the
    /// account holds no copy.
    #[tracing::instrument(skip(self, session), fields(book_id = %id))]
    pub async fn return_book(&self, session: &Session, id: &BookId) -> LibraryResult<TxReceipt> {
        let signer = session.signer()?;
        let record = self.ledger_book(id).await?;
        if !record.borrowers.iter().any(|b| b.address == signer) {
            return Err(InvariantViolation::NotBorrowed { book_id: id.clone(), borrower: signer }
                .into());
        }

        let id = id.clone();
        self.submit(&signer, format!("return:{id}"), move |ledger, signer| async move {
            ledger.return_book(&signer, &id).await
        })
        .await
    }

    /// Publishes a draft's cover and metadata, then adds the book.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Content`] if publishing fails; nothing is
    /// submitted in that case.
    #[tracing::instrument(skip(self, session, draft), fields(title = %draft.title))]
    pub async fn add_book(&self, session: &Session, draft: BookDraft) -> LibraryResult<TxReceipt> {
        let signer = session.signer()?;
        let metadata_uri = self.publish_metadata(&draft).await?;
        let quantity = draft.quantity;

        let operation = format!("add:{metadata_uri}");
        self.submit(&signer, operation, move |ledger, signer| async move {
            ledger.add_book(&signer, &metadata_uri, quantity).await
        })
        .await
    }

    /// Publishes new metadata and updates the book.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::QuantityBelowBorrowed`] before
    /// publishing if the new quantity is below the copies on loan.
    #[tracing::instrument(skip(self, session, draft), fields(book_id = %id))]
    pub async fn update_book(
        &self,
        session: &Session,
        id: &BookId,
        draft: BookDraft,
    ) -> LibraryResult<TxReceipt> {
        let signer = session.signer()?;
        let record = self.ledger_book(id).await?;
        let borrowed = self.reconciler.counts(&record).await.borrowed();
        if draft.quantity < borrowed {
            return Err(InvariantViolation::QuantityBelowBorrowed {
                book_id: id.clone(),
                requested: draft.quantity,
                borrowed,
            }
            .into());
        }

        let metadata_uri = self.publish_metadata(&draft).await?;
        let quantity = draft.quantity;
        let id = id.clone();
        self.submit(&signer, format!("update:{id}"), move |ledger, signer| async move {
            ledger.update_book(&signer, &id, &metadata_uri, quantity).await
        })
        .await
    }

    /// Deletes a book with no copies on loan.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::OutstandingLoans`] before submitting if
    /// any copy is borrowed.
    #[tracing::instrument(skip(self, session), fields(book_id = %id))]
    pub async fn delete_book(&self, session: &Session, id: &BookId) -> LibraryResult<TxReceipt> {
        let signer = session.signer()?;
        let record = self.ledger_book(id).await?;
        let outstanding = self.reconciler.counts(&record).await.borrowed();
        if outstanding > 0 {
            return Err(InvariantViolation::OutstandingLoans { book_id: id.clone(), outstanding }
                .into());
        }

        let id = id.clone();
        self.submit(&signer, format!("delete:{id}"), move |ledger, signer| async move {
            ledger.delete_book(&signer, &id).await
        })
        .await
    }

    // ---- history ----

    /// Lists every borrow, joined with current book titles.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the log or the book list cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn get_borrow_history(&self) -> LibraryResult<Vec<BorrowHistory>> {
        let raw = self.ledger.get_borrow_history().await?;
        let report = self.get_books().await?;
        Ok(compose_history(&raw, &report.books))
    }

    /// Lists the borrows of one account.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the log or the book list cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_borrow_history(
        &self,
        borrower: &Address,
    ) -> LibraryResult<Vec<BorrowHistory>> {
        let raw = self.ledger.get_user_borrow_history(borrower).await?;
        let raw = filter_by_borrower(raw, borrower);
        let report = self.get_books().await?;
        Ok(compose_history(&raw, &report.books))
    }

    // ---- roles ----

    /// Returns the (possibly cached) role registry.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if a reload failed.
    pub async fn roles(&self) -> LibraryResult<Arc<RoleSnapshot>> {
        Ok(self.roles.snapshot().await?)
    }

    /// Asks the ledger whether `address` is an admin.
    ///
    /// # Errors
    ///
    /// Returns the ledger error.
    pub async fn is_admin(&self, address: &Address) -> LibraryResult<bool> {
        Ok(self.ledger.is_admin(address).await?)
    }

    /// Asks the ledger whether `address` is a registered user.
    ///
    /// # Errors
    ///
    /// Returns the ledger error.
    pub async fn is_user(&self, address: &Address) -> LibraryResult<bool> {
        Ok(self.ledger.is_user(address).await?)
    }

    /// Returns the tier of `address`.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the registry could not be read.
    pub async fn tier_of(&self, address: &Address) -> LibraryResult<Tier> {
        Ok(self.roles.tier_of(address).await?)
    }

    /// Returns the UX gates for `address`.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the registry could not be read.
    pub async fn permissions(&self, address: &Address) -> LibraryResult<Permissions> {
        Ok(self.roles.permissions(address).await?)
    }

    /// Grants the user role.
    ///
    /// # Errors
    ///
    /// Returns the ledger error; the ledger reverts unless the signer is
    /// the super admin.
    pub async fn add_user(&self, session: &Session, address: &Address) -> LibraryResult<TxReceipt> {
        self.role_mutation(session, "add_user", address, |ledger, signer, target| async move {
            ledger.add_user(&signer, &target).await
        })
        .await
    }

    /// Revokes the user role.
    ///
    /// # Errors
    ///
    /// Returns the ledger error.
    pub async fn remove_user(
        &self,
        session: &Session,
        address: &Address,
    ) -> LibraryResult<TxReceipt> {
        self.role_mutation(session, "remove_user", address, |ledger, signer, target| async move {
            ledger.remove_user(&signer, &target).await
        })
        .await
    }

    /// Grants the admin role.
    ///
    /// # Errors
    ///
    /// Returns the ledger error.
    pub async fn make_admin(
        &self,
        session: &Session,
        address: &Address,
    ) -> LibraryResult<TxReceipt> {
        self.role_mutation(session, "make_admin", address, |ledger, signer, target| async move {
            ledger.make_admin(&signer, &target).await
        })
        .await
    }

    /// Revokes the admin role.
    ///
    /// # Errors
    ///
    /// Returns the ledger error.
    pub async fn remove_admin(
        &self,
        session: &Session,
        address: &Address,
    ) -> LibraryResult<TxReceipt> {
        self.role_mutation(session, "remove_admin", address, |ledger, signer, target| async move {
            ledger.remove_admin(&signer, &target).await
        })
        .await
    }

    /// Registers the session account unless it already is a user.
    ///
    /// Concurrent calls for the same account share one submission, and a
    /// confirmed registration is remembered until the account changes.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UserRejected`] if the signature is declined;
    /// a later call may try again.
    #[tracing::instrument(skip(self, session))]
    pub async fn ensure_registered(&self, session: &Session) -> LibraryResult<Registration> {
        let signer = session.signer()?;
        if self.ledger.is_user(&signer).await? {
            return Ok(Registration::AlreadyRegistered);
        }

        let ledger = Arc::clone(&self.ledger);
        let key = FlightKey::new(signer.clone(), "register");
        let receipt = self
            .orchestrator
            .submit(key, Retention::UntilIdentityChanges, move || async move {
                ledger.register(&signer).await.map_err(LibraryError::from)
            })
            .await?;
        self.roles.invalidate().await;
        Ok(Registration::Registered(receipt))
    }

    // ---- session ----

    /// Applies a wallet event and drops state tied to the old identity.
    pub async fn handle_wallet_event(
        &self,
        session: &Session,
        event: WalletEvent,
    ) -> IdentityChange {
        let change = session.apply_event(event);
        match &change {
            IdentityChange::Unchanged => {},
            IdentityChange::Switched(address) => self.orchestrator.retain_identity(address),
            IdentityChange::ChainSwitched(_) => {
                self.orchestrator.clear();
                self.roles.invalidate().await;
            },
            IdentityChange::Disconnected => self.orchestrator.clear(),
        }
        change
    }

    /// Disconnects the session and abandons its pending flights.
    pub fn disconnect(&self, session: &Session) {
        session.disconnect();
        self.orchestrator.clear();
    }

    // ---- internals ----

    async fn ledger_book(&self, id: &BookId) -> LibraryResult<LedgerBook> {
        match self.ledger.get_book(id).await {
            Ok(record) => Ok(record),
            Err(LedgerError::NotFound { .. }) => Err(LibraryError::BookNotFound { id: id.clone() }),
            Err(err) => Err(err.into()),
        }
    }

    async fn publish_metadata(&self, draft: &BookDraft) -> LibraryResult<String> {
        let cover_image = match &draft.cover {
            CoverSource::Uri(uri) => uri.clone(),
            CoverSource::Upload { file_name, bytes } => {
                self.content.publish_bytes(file_name, Bytes::from(bytes.clone())).await?
            },
        };
        let document = BookDocument::from_draft(draft, cover_image);
        let value = serde_json::to_value(&document)
            .map_err(|e| ContentError::publish(e.to_string()))?;
        let uri = self.content.publish_json(&value).await?;
        tracing::debug!(uri, "metadata published");
        Ok(uri)
    }

    async fn submit<F, Fut>(
        &self,
        signer: &Address,
        operation: String,
        call: F,
    ) -> LibraryResult<TxReceipt>
    where
        F: FnOnce(Arc<dyn LedgerClient>, Address) -> Fut,
        Fut: Future<Output = LedgerResult<TxReceipt>> + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        let key = FlightKey::new(signer.clone(), operation);
        let signer = signer.clone();
        self.orchestrator
            .submit(key, Retention::UntilSettled, move || {
                let pending = call(ledger, signer);
                async move { pending.await.map_err(LibraryError::from) }
            })
            .await
    }

    async fn role_mutation<F, Fut>(
        &self,
        session: &Session,
        operation: &str,
        target: &Address,
        call: F,
    ) -> LibraryResult<TxReceipt>
    where
        F: FnOnce(Arc<dyn LedgerClient>, Address, Address) -> Fut,
        Fut: Future<Output = LedgerResult<TxReceipt>> + Send + 'static,
    {
        let signer = session.signer()?;
        let target = target.clone();
        let key = format!("{operation}:{target}");
        let receipt =
            self.submit(&signer, key, move |ledger, signer| call(ledger, signer, target)).await?;
        self.roles.invalidate().await;
        Ok(receipt)
    }
}

impl std::fmt::Debug for LibraryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryService")
            .field("reconciler", &self.reconciler)
            .field("roles", &self.roles)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}
