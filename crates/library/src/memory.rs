//! In-memory implementations of the ledger, content store and wallet.
//!
//! This module provides [`MemoryLedger`], [`MemoryContentStore`] and
//! [`MockWallet`], suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ledger rules**: [`MemoryLedger`] enforces roles, copy counts and outstanding loans the
//!   way the deployed ledger does, reverting with a reason
//! - **Fault hooks**: signature rejection, disconnection, read failures and confirmation delays
//!   can be injected per test
//!
//! # Example
//!
//! ```
//! use shelfchain_library::{Address, LedgerClient, MemoryLedger};
//!
//! #[tokio::main]
//! async fn main() {
//!     let owner = Address::parse("0xowner");
//!     let ledger = MemoryLedger::new(owner.clone());
//!
//!     ledger.add_book(&owner, "ipfs://doc", 2).await.unwrap();
//!     let books = ledger.get_books().await.unwrap();
//!
//!     assert_eq!(books[0].quantity, Some(2));
//! }
//! ```
//!
//! # Limitations
//!
//! - State is not persisted
//! - Confirmation is immediate unless a delay is configured

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{
    content::ContentStore,
    error::{ContentError, ContentResult, LedgerError, LedgerResult},
    ledger::LedgerClient,
    session::{WalletEvent, WalletProvider},
    types::{Address, BookId, Borrower, LedgerBook, LedgerLogEntry, TxHash, TxReceipt},
};

#[derive(Debug)]
struct LedgerState {
    books: Vec<LedgerBook>,
    log: Vec<LedgerLogEntry>,
    next_book_id: u64,
    super_admin: Address,
    admins: BTreeSet<Address>,
    users: BTreeSet<Address>,
    block_number: u64,
    submitted: u64,
    calls: HashMap<&'static str, u64>,
    connected: bool,
    reject_next_signature: bool,
    read_error: Option<LedgerError>,
    confirmation_delay: Duration,
}

impl LedgerState {
    fn read(&mut self, procedure: &'static str) -> LedgerResult<()> {
        *self.calls.entry(procedure).or_default() += 1;
        if !self.connected {
            return Err(LedgerError::connection_unavailable("provider disconnected"));
        }
        match &self.read_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn is_admin(&self, address: &Address) -> bool {
        address == &self.super_admin || self.admins.contains(address)
    }

    fn is_registered(&self, address: &Address) -> bool {
        self.is_admin(address) || self.users.contains(address)
    }

    fn require_admin(&self, signer: &Address) -> LedgerResult<()> {
        if self.is_admin(signer) {
            Ok(())
        } else {
            Err(LedgerError::reverted("Caller is not an admin"))
        }
    }

    fn require_super_admin(&self, signer: &Address) -> LedgerResult<()> {
        if signer == &self.super_admin {
            Ok(())
        } else {
            Err(LedgerError::reverted("Caller is not the super admin"))
        }
    }

    fn book_mut(&mut self, id: &BookId) -> LedgerResult<&mut LedgerBook> {
        self.books
            .iter_mut()
            .find(|b| &b.id == id)
            .ok_or_else(|| LedgerError::reverted("Book does not exist"))
    }
}

fn copy_counts(book: &LedgerBook) -> (u64, u64) {
    let quantity = book.quantity.unwrap_or(0);
    let available = book.available.unwrap_or(quantity).min(quantity);
    (quantity, available)
}

/// In-memory ledger enforcing the deployed ledger's rules.
///
/// # Cloning
///
/// `MemoryLedger` is cheaply cloneable via [`Arc`]. All clones share the
/// same state.
#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedger {
    /// Creates an empty ledger deployed by `super_admin`.
    #[must_use]
    pub fn new(super_admin: Address) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                books: Vec::new(),
                log: Vec::new(),
                next_book_id: 1,
                super_admin,
                admins: BTreeSet::new(),
                users: BTreeSet::new(),
                block_number: 0,
                submitted: 0,
                calls: HashMap::new(),
                connected: true,
                reject_next_signature: false,
                read_error: None,
                confirmation_delay: Duration::ZERO,
            })),
        }
    }

    /// Stores a raw book record as-is, bypassing every rule.
    ///
    /// Use this to seed records the ledger would return in the wild,
    /// including malformed ones.
    pub fn insert_raw_book(&self, book: LedgerBook) {
        let mut state = self.state.write();
        if let Ok(id) = book.id.as_str().parse::<u64>() {
            state.next_book_id = state.next_book_id.max(id + 1);
        }
        state.books.push(book);
    }

    /// Appends a raw borrow log entry.
    pub fn push_log_entry(&self, entry: LedgerLogEntry) {
        self.state.write().log.push(entry);
    }

    /// Grants the admin role without a transaction.
    pub fn seed_admin(&self, address: Address) {
        self.state.write().admins.insert(address);
    }

    /// Registers a user without a transaction.
    pub fn seed_user(&self, address: Address) {
        self.state.write().users.insert(address);
    }

    /// Makes the next write fail with [`LedgerError::UserRejected`].
    pub fn reject_next_signature(&self) {
        self.state.write().reject_next_signature = true;
    }

    /// Simulates losing or regaining the provider.
    pub fn set_connected(&self, connected: bool) {
        self.state.write().connected = connected;
    }

    /// Makes every read fail with `error` until cleared with `None`.
    pub fn set_read_error(&self, error: Option<LedgerError>) {
        self.state.write().read_error = error;
    }

    /// Delays confirmation of every subsequent write.
    pub fn set_confirmation_delay(&self, delay: Duration) {
        self.state.write().confirmation_delay = delay;
    }

    /// Number of writes submitted for signing, including reverted ones.
    #[must_use]
    pub fn submitted_transactions(&self) -> u64 {
        self.state.read().submitted
    }

    /// Number of times a read procedure was called.
    #[must_use]
    pub fn call_count(&self, procedure: &str) -> u64 {
        self.state.read().calls.get(procedure).copied().unwrap_or(0)
    }

    async fn transact<F>(
        &self,
        signer: &Address,
        procedure: &'static str,
        apply: F,
    ) -> LedgerResult<TxReceipt>
    where
        F: FnOnce(&mut LedgerState, &TxHash) -> LedgerResult<()> + Send,
    {
        let (tx_hash, delay) = {
            let mut state = self.state.write();
            if !state.connected {
                return Err(LedgerError::connection_unavailable("provider disconnected"));
            }
            if std::mem::take(&mut state.reject_next_signature) {
                return Err(LedgerError::UserRejected);
            }
            state.submitted += 1;
            (TxHash::new(format!("0x{:064x}", state.submitted)), state.confirmation_delay)
        };
        tracing::info!(procedure, %signer, %tx_hash, "transaction submitted");

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write();
        apply(&mut state, &tx_hash)?;
        state.block_number += 1;
        let receipt = TxReceipt { tx_hash, block_number: Some(state.block_number) };
        tracing::info!(procedure, tx_hash = %receipt.tx_hash, "transaction confirmed");
        Ok(receipt)
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryLedger")
            .field("books", &state.books.len())
            .field("log", &state.log.len())
            .field("submitted", &state.submitted)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_books(&self) -> LedgerResult<Vec<LedgerBook>> {
        let mut state = self.state.write();
        state.read("get_books")?;
        Ok(state.books.clone())
    }

    async fn get_book(&self, id: &BookId) -> LedgerResult<LedgerBook> {
        let mut state = self.state.write();
        state.read("get_book")?;
        state
            .books
            .iter()
            .find(|b| &b.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("book {id}")))
    }

    async fn get_borrow_history(&self) -> LedgerResult<Vec<LedgerLogEntry>> {
        let mut state = self.state.write();
        state.read("get_borrow_history")?;
        Ok(state.log.clone())
    }

    async fn get_user_borrow_history(
        &self,
        borrower: &Address,
    ) -> LedgerResult<Vec<LedgerLogEntry>> {
        let mut state = self.state.write();
        state.read("get_user_borrow_history")?;
        Ok(state.log.iter().filter(|e| &e.borrower == borrower).cloned().collect())
    }

    async fn is_admin(&self, address: &Address) -> LedgerResult<bool> {
        let mut state = self.state.write();
        state.read("is_admin")?;
        Ok(state.is_admin(address))
    }

    async fn is_user(&self, address: &Address) -> LedgerResult<bool> {
        let mut state = self.state.write();
        state.read("is_user")?;
        Ok(state.users.contains(address))
    }

    async fn get_super_admin(&self) -> LedgerResult<Address> {
        let mut state = self.state.write();
        state.read("get_super_admin")?;
        Ok(state.super_admin.clone())
    }

    async fn get_all_admins(&self) -> LedgerResult<Vec<Address>> {
        let mut state = self.state.write();
        state.read("get_all_admins")?;
        Ok(state.admins.iter().cloned().collect())
    }

    async fn get_all_users(&self) -> LedgerResult<Vec<Address>> {
        let mut state = self.state.write();
        state.read("get_all_users")?;
        Ok(state.users.iter().cloned().collect())
    }

    async fn add_book(
        &self,
        signer: &Address,
        metadata_uri: &str,
        quantity: u64,
    ) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let metadata_uri = metadata_uri.to_owned();
        self.transact(signer, "add_book", move |state, _| {
            state.require_admin(&signer_owned)?;
            let id = BookId::from(state.next_book_id);
            state.next_book_id += 1;
            state.books.push(LedgerBook {
                id,
                metadata_uri: Some(metadata_uri),
                quantity: Some(quantity),
                available: Some(quantity),
                ..LedgerBook::default()
            });
            Ok(())
        })
        .await
    }

    async fn update_book(
        &self,
        signer: &Address,
        id: &BookId,
        metadata_uri: &str,
        quantity: u64,
    ) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let id = id.clone();
        let metadata_uri = metadata_uri.to_owned();
        self.transact(signer, "update_book", move |state, _| {
            state.require_admin(&signer_owned)?;
            let book = state.book_mut(&id)?;
            let (current, available) = copy_counts(book);
            let borrowed = current - available;
            if quantity < borrowed {
                return Err(LedgerError::reverted("Cannot reduce quantity below borrowed count"));
            }
            book.metadata_uri = Some(metadata_uri);
            book.quantity = Some(quantity);
            book.available = Some(quantity - borrowed);
            Ok(())
        })
        .await
    }

    async fn delete_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let id = id.clone();
        self.transact(signer, "delete_book", move |state, _| {
            state.require_admin(&signer_owned)?;
            let (quantity, available) = copy_counts(state.book_mut(&id)?);
            if available < quantity {
                return Err(LedgerError::reverted("Cannot delete book while copies are borrowed"));
            }
            state.books.retain(|b| b.id != id);
            Ok(())
        })
        .await
    }

    async fn borrow_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let id = id.clone();
        self.transact(signer, "borrow_book", move |state, tx_hash| {
            if !state.is_registered(&signer_owned) {
                return Err(LedgerError::reverted("Caller is not a registered user"));
            }
            let now = Utc::now();
            let book = state.book_mut(&id)?;
            let (quantity, available) = copy_counts(book);
            if available == 0 {
                return Err(LedgerError::reverted("No copies available"));
            }
            if book.borrowers.iter().any(|b| b.address == signer_owned) {
                return Err(LedgerError::reverted("You already have a copy of this book"));
            }
            book.quantity = Some(quantity);
            book.available = Some(available - 1);
            book.borrowers.push(Borrower { address: signer_owned.clone(), borrow_date: now });
            state.log.push(LedgerLogEntry {
                book_id: id,
                borrower: signer_owned,
                timestamp: now.timestamp(),
                returned: false,
                return_timestamp: None,
                tx_hash: Some(tx_hash.clone()),
            });
            Ok(())
        })
        .await
    }

    async fn return_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let id = id.clone();
        self.transact(signer, "return_book", move |state, _| {
            let now = Utc::now();
            let book = state.book_mut(&id)?;
            let Some(position) = book.borrowers.iter().position(|b| b.address == signer_owned)
            else {
                return Err(LedgerError::reverted("You haven't borrowed this book"));
            };
            let (quantity, available) = copy_counts(book);
            book.borrowers.remove(position);
            book.quantity = Some(quantity);
            book.available = Some((available + 1).min(quantity));
            if let Some(entry) = state
                .log
                .iter_mut()
                .rev()
                .find(|e| e.book_id == id && e.borrower == signer_owned && !e.returned)
            {
                entry.returned = true;
                entry.return_timestamp = Some(now.timestamp());
            }
            Ok(())
        })
        .await
    }

    async fn register(&self, signer: &Address) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        self.transact(signer, "register", move |state, _| {
            if !state.users.insert(signer_owned) {
                return Err(LedgerError::reverted("User already registered"));
            }
            Ok(())
        })
        .await
    }

    async fn add_user(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let address = address.clone();
        self.transact(signer, "add_user", move |state, _| {
            state.require_super_admin(&signer_owned)?;
            if !state.users.insert(address) {
                return Err(LedgerError::reverted("Address is already a user"));
            }
            Ok(())
        })
        .await
    }

    async fn remove_user(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let address = address.clone();
        self.transact(signer, "remove_user", move |state, _| {
            state.require_super_admin(&signer_owned)?;
            if !state.users.remove(&address) {
                return Err(LedgerError::reverted("Address is not a user"));
            }
            Ok(())
        })
        .await
    }

    async fn make_admin(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let address = address.clone();
        self.transact(signer, "make_admin", move |state, _| {
            state.require_super_admin(&signer_owned)?;
            if address == state.super_admin {
                return Err(LedgerError::reverted("Super admin cannot be made an admin"));
            }
            if !state.admins.insert(address) {
                return Err(LedgerError::reverted("Address is already an admin"));
            }
            Ok(())
        })
        .await
    }

    async fn remove_admin(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        let signer_owned = signer.clone();
        let address = address.clone();
        self.transact(signer, "remove_admin", move |state, _| {
            state.require_super_admin(&signer_owned)?;
            if address == state.super_admin {
                return Err(LedgerError::reverted("Cannot remove the super admin"));
            }
            if !state.admins.remove(&address) {
                return Err(LedgerError::reverted("Address is not an admin"));
            }
            Ok(())
        })
        .await
    }
}

#[derive(Debug, Clone)]
struct StoredContent {
    bytes: Bytes,
    delay: Duration,
}

/// In-memory content store keyed by URI.
///
/// Published documents receive `mem://<n>` URIs.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    entries: RwLock<HashMap<String, StoredContent>>,
    next_uri: AtomicU64,
    fetches: AtomicU64,
    fail_publish: AtomicBool,
}

impl MemoryContentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` serialized as JSON at `uri`.
    pub fn insert_json(&self, uri: &str, value: &serde_json::Value) {
        self.insert_raw(uri, Bytes::from(value.to_string()));
    }

    /// Stores `value` at `uri`, answering fetches only after `delay`.
    pub fn insert_json_delayed(&self, uri: &str, value: &serde_json::Value, delay: Duration) {
        self.entries
            .write()
            .insert(uri.to_owned(), StoredContent { bytes: Bytes::from(value.to_string()), delay });
    }

    /// Stores raw bytes at `uri`.
    pub fn insert_raw(&self, uri: &str, bytes: Bytes) {
        self.entries.write().insert(uri.to_owned(), StoredContent { bytes, delay: Duration::ZERO });
    }

    /// Returns the JSON document stored at `uri`, if any.
    #[must_use]
    pub fn get_json(&self, uri: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read();
        serde_json::from_slice(&entries.get(uri)?.bytes).ok()
    }

    /// Makes every subsequent publish fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Number of fetches served or attempted.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn publish(&self, bytes: Bytes) -> ContentResult<String> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ContentError::publish("pinning service rejected the request"));
        }
        let uri = format!("mem://{}", self.next_uri.fetch_add(1, Ordering::SeqCst));
        self.insert_raw(&uri, bytes);
        Ok(uri)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn fetch(&self, uri: &str) -> ContentResult<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let entry = self.entries.read().get(uri).cloned();
        let Some(entry) = entry else {
            return Err(ContentError::unavailable(uri, "no such document"));
        };
        if !entry.delay.is_zero() {
            tokio::time::sleep(entry.delay).await;
        }
        Ok(entry.bytes)
    }

    async fn publish_json(&self, document: &serde_json::Value) -> ContentResult<String> {
        self.publish(Bytes::from(document.to_string()))
    }

    async fn publish_bytes(&self, _file_name: &str, bytes: Bytes) -> ContentResult<String> {
        self.publish(bytes)
    }
}

/// Scripted [`WalletProvider`] for tests.
///
/// [`emit`](Self::emit) updates the wallet's own view and broadcasts the
/// event to every subscriber.
#[derive(Debug)]
pub struct MockWallet {
    accounts: RwLock<Vec<Address>>,
    chain_id: RwLock<String>,
    balances: RwLock<HashMap<Address, String>>,
    reject_requests: AtomicBool,
    events: broadcast::Sender<WalletEvent>,
}

impl MockWallet {
    /// Creates a wallet exposing `accounts` on `chain_id`.
    #[must_use]
    pub fn new(accounts: Vec<Address>, chain_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: RwLock::new(accounts),
            chain_id: RwLock::new(chain_id.into()),
            balances: RwLock::new(HashMap::new()),
            reject_requests: AtomicBool::new(false),
            events,
        }
    }

    /// Sets the hex-encoded balance reported for `address`.
    pub fn set_balance(&self, address: Address, hex: impl Into<String>) {
        self.balances.write().insert(address, hex.into());
    }

    /// Makes account requests fail as if the user declined them.
    pub fn set_reject_requests(&self, reject: bool) {
        self.reject_requests.store(reject, Ordering::SeqCst);
    }

    /// Applies `event` to the wallet and broadcasts it.
    pub fn emit(&self, event: WalletEvent) {
        match &event {
            WalletEvent::AccountsChanged(accounts) => *self.accounts.write() = accounts.clone(),
            WalletEvent::ChainChanged(chain_id) => *self.chain_id.write() = chain_id.clone(),
            WalletEvent::Disconnected => self.accounts.write().clear(),
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> LedgerResult<Vec<Address>> {
        if self.reject_requests.load(Ordering::SeqCst) {
            return Err(LedgerError::UserRejected);
        }
        Ok(self.accounts.read().clone())
    }

    async fn chain_id(&self) -> LedgerResult<String> {
        Ok(self.chain_id.read().clone())
    }

    async fn balance(&self, address: &Address) -> LedgerResult<String> {
        Ok(self.balances.read().get(address).cloned().unwrap_or_else(|| "0x0".to_owned()))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
