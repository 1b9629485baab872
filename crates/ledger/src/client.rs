//! [`RpcLedger`], a [`LedgerClient`] over JSON-RPC 2.0.
//!
//! # Wire Protocol
//!
//! | Operation        | Method                          | Params                                  |
//! |------------------|---------------------------------|-----------------------------------------|
//! | handshake        | `ledger_chainId`                | `[]`                                    |
//! | read             | `ledger_call`                   | `[{ to, procedure, args }]`             |
//! | write            | `ledger_sendTransaction`        | `[{ from, to, procedure, args }]`       |
//! | confirmation     | `ledger_getTransactionReceipt`  | `[txHash]` → receipt or `null`          |
//!
//! ```text
//! read:  connect ─► with_retry_timeout(ledger_call) ─► decode
//! write: connect ─► ledger_sendTransaction ─► poll receipt ─┬─► confirmed ─► TxReceipt
//!                   (once, never retried)                   ├─► reverted  ─► Reverted
//!                                                           └─► deadline  ─► Timeout
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fail::fail_point;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use shelfchain_library::{
    Address, BookId, ConfigError, LedgerBook, LedgerClient, LedgerError, LedgerLogEntry,
    LedgerResult, TxHash, TxReceipt,
};
use tokio::sync::OnceCell;

use crate::{
    config::RpcLedgerConfig,
    error::{RpcError, RpcErrorObject, RpcResult},
    retry::with_retry_timeout,
};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    #[serde(default, alias = "txHash")]
    transaction_hash: Option<TxHash>,
    #[serde(default)]
    block_number: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    revert_reason: Option<String>,
}

fn quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

impl RawReceipt {
    fn is_reverted(&self) -> bool {
        match &self.status {
            Some(Value::String(s)) => matches!(s.as_str(), "reverted" | "failed" | "0x0"),
            Some(Value::Number(n)) => n.as_u64() == Some(0),
            Some(Value::Bool(ok)) => !ok,
            _ => false,
        }
    }

    fn into_receipt(self, submitted: &TxHash) -> LedgerResult<TxReceipt> {
        if self.is_reverted() {
            return Err(LedgerError::reverted(
                self.revert_reason.unwrap_or_else(|| "transaction reverted".to_owned()),
            ));
        }
        Ok(TxReceipt {
            tx_hash: self.transaction_hash.unwrap_or_else(|| submitted.clone()),
            block_number: self.block_number.as_ref().and_then(quantity),
        })
    }
}

/// JSON-RPC ledger client.
///
/// The client is cheap to share behind an [`Arc`](std::sync::Arc); it holds
/// one pooled HTTP client and the chain id learned at the handshake.
///
/// # Example
///
/// ```no_run
/// use shelfchain_ledger::{RpcLedger, RpcLedgerConfig};
/// use shelfchain_library::LedgerClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RpcLedgerConfig::builder()
///     .endpoint("http://localhost:8545")
///     .contract("0x5fbdb2315678afecb367f032d93f642f64180aa3")
///     .build()?;
/// let ledger = RpcLedger::new(config)?;
/// let books = ledger.get_books().await?;
/// println!("{} books on the shelf", books.len());
/// # Ok(())
/// # }
/// ```
pub struct RpcLedger {
    http: reqwest::Client,
    config: RpcLedgerConfig,
    chain_id: OnceCell<String>,
    next_id: AtomicU64,
}

impl RpcLedger {
    /// Creates a client. No network traffic happens until first use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: RpcLedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid { field: "http_client", message: e.to_string() })?;
        Ok(Self { http, config, chain_id: OnceCell::new(), next_id: AtomicU64::new(1) })
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &RpcLedgerConfig {
        &self.config
    }

    /// The chain id reported at the handshake, once connected.
    #[must_use]
    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.get().map(String::as_str)
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> RpcResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let response = self.http.post(self.config.endpoint()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status { status: status.as_u16() });
        }
        let response: RpcResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(RpcError::Remote(error));
        }
        Ok(serde_json::from_value(response.result.unwrap_or(Value::Null))?)
    }

    async fn ensure_connected(&self) -> LedgerResult<&str> {
        let chain_id = self
            .chain_id
            .get_or_try_init(|| async {
                let chain_id: String = with_retry_timeout(
                    self.config.retry(),
                    self.config.read_timeout(),
                    "ledger_chainId",
                    move || async move {
                        self.rpc("ledger_chainId", json!([])).await.map_err(LedgerError::from)
                    },
                )
                .await?;
                tracing::info!(endpoint = self.config.endpoint(), %chain_id, "connected to ledger");
                Ok::<_, LedgerError>(chain_id)
            })
            .await?;
        Ok(chain_id.as_str())
    }

    async fn read<T: DeserializeOwned>(
        &self,
        procedure: &'static str,
        args: Value,
    ) -> LedgerResult<T> {
        self.ensure_connected().await?;
        let params =
            json!([{ "to": self.config.contract(), "procedure": procedure, "args": args }]);
        with_retry_timeout(self.config.retry(), self.config.read_timeout(), procedure, move || {
            let params = params.clone();
            async move { self.rpc("ledger_call", params).await.map_err(LedgerError::from) }
        })
        .await
    }

    async fn transact(
        &self,
        signer: &Address,
        procedure: &'static str,
        args: Value,
    ) -> LedgerResult<TxReceipt> {
        self.ensure_connected().await?;
        let params = json!([{
            "from": signer,
            "to": self.config.contract(),
            "procedure": procedure,
            "args": args,
        }]);
        let tx_hash: TxHash = self.rpc("ledger_sendTransaction", params).await?;
        tracing::info!(procedure, %signer, %tx_hash, "transaction submitted");

        let receipt = tokio::time::timeout(
            self.config.confirmation_timeout(),
            self.await_confirmation(&tx_hash),
        )
        .await
        .map_err(|_| {
            tracing::warn!(procedure, %tx_hash, "confirmation timed out");
            LedgerError::Timeout
        })??;
        tracing::info!(
            procedure,
            tx_hash = %receipt.tx_hash,
            block = ?receipt.block_number,
            "transaction confirmed",
        );
        Ok(receipt)
    }

    async fn await_confirmation(&self, tx_hash: &TxHash) -> LedgerResult<TxReceipt> {
        loop {
            fail_point!("rpc-receipt-poll", |_| Err(LedgerError::Timeout));

            let polled =
                self.rpc::<Option<RawReceipt>>("ledger_getTransactionReceipt", json!([tx_hash]));
            match polled.await {
                Ok(Some(raw)) => return raw.into_receipt(tx_hash),
                Ok(None) => {},
                Err(err) => {
                    // The transaction is already out; keep polling through transport noise.
                    let err = LedgerError::from(err);
                    if !err.is_transient() {
                        return Err(err);
                    }
                    tracing::debug!(%tx_hash, error = %err, "receipt poll failed");
                },
            }
            tokio::time::sleep(self.config.confirmation_poll_interval()).await;
        }
    }
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("endpoint", &self.config.endpoint())
            .field("contract", self.config.contract())
            .field("chain_id", &self.chain_id.get())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn connect(&self) -> LedgerResult<()> {
        self.ensure_connected().await.map(|_| ())
    }

    #[tracing::instrument(skip(self))]
    async fn get_books(&self) -> LedgerResult<Vec<LedgerBook>> {
        self.read("getBooks", json!([])).await
    }

    #[tracing::instrument(skip(self), fields(book_id = %id))]
    async fn get_book(&self, id: &BookId) -> LedgerResult<LedgerBook> {
        let book: Option<LedgerBook> = self.read("getBook", json!([id.as_str()])).await?;
        book.ok_or_else(|| LedgerError::not_found(format!("book {id}")))
    }

    #[tracing::instrument(skip(self))]
    async fn get_borrow_history(&self) -> LedgerResult<Vec<LedgerLogEntry>> {
        self.read("getBorrowHistory", json!([])).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_user_borrow_history(
        &self,
        borrower: &Address,
    ) -> LedgerResult<Vec<LedgerLogEntry>> {
        self.read("getUserBorrowHistory", json!([borrower])).await
    }

    #[tracing::instrument(skip(self))]
    async fn is_admin(&self, address: &Address) -> LedgerResult<bool> {
        self.read("isAdmin", json!([address])).await
    }

    #[tracing::instrument(skip(self))]
    async fn is_user(&self, address: &Address) -> LedgerResult<bool> {
        self.read("isUser", json!([address])).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_super_admin(&self) -> LedgerResult<Address> {
        self.read("superAdmin", json!([])).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_all_admins(&self) -> LedgerResult<Vec<Address>> {
        self.read("getAllAdmins", json!([])).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_all_users(&self) -> LedgerResult<Vec<Address>> {
        self.read("getAllUsers", json!([])).await
    }

    #[tracing::instrument(skip(self))]
    async fn add_book(
        &self,
        signer: &Address,
        metadata_uri: &str,
        quantity: u64,
    ) -> LedgerResult<TxReceipt> {
        self.transact(signer, "addBook", json!([metadata_uri, quantity])).await
    }

    #[tracing::instrument(skip(self), fields(book_id = %id))]
    async fn update_book(
        &self,
        signer: &Address,
        id: &BookId,
        metadata_uri: &str,
        quantity: u64,
    ) -> LedgerResult<TxReceipt> {
        self.transact(signer, "updateBook", json!([id.as_str(), metadata_uri, quantity])).await
    }

    #[tracing::instrument(skip(self), fields(book_id = %id))]
    async fn delete_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt> {
        self.transact(signer, "deleteBook", json!([id.as_str()])).await
    }

    #[tracing::instrument(skip(self), fields(book_id = %id))]
    async fn borrow_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt> {
        self.transact(signer, "borrowBook", json!([id.as_str()])).await
    }

    #[tracing::instrument(skip(self), fields(book_id = %id))]
    async fn return_book(&self, signer: &Address, id: &BookId) -> LedgerResult<TxReceipt> {
        self.transact(signer, "returnBook", json!([id.as_str()])).await
    }

    #[tracing::instrument(skip(self))]
    async fn register(&self, signer: &Address) -> LedgerResult<TxReceipt> {
        self.transact(signer, "register", json!([])).await
    }

    #[tracing::instrument(skip(self))]
    async fn add_user(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        self.transact(signer, "addUser", json!([address])).await
    }

    #[tracing::instrument(skip(self))]
    async fn remove_user(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        self.transact(signer, "removeUser", json!([address])).await
    }

    #[tracing::instrument(skip(self))]
    async fn make_admin(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        self.transact(signer, "makeAdmin", json!([address])).await
    }

    #[tracing::instrument(skip(self))]
    async fn remove_admin(&self, signer: &Address, address: &Address) -> LedgerResult<TxReceipt> {
        self.transact(signer, "removeAdmin", json!([address])).await
    }
}
