//! Wallet session: the explicit connection context.
//!
//! A [`Session`] owns one [`WalletProvider`] and the account currently bound
//! to it. Nothing is global: every write in
//! [`LibraryService`](crate::LibraryService) takes the session whose account
//! signs it, and tearing a session down is an explicit
//! [`disconnect`](Session::disconnect).
//!
//! ```text
//! connect() ──► request_accounts ──► chain_id ──► Account bound
//!    │                                                 │
//!    └──── already bound? return it ◄──────────────────┘
//!
//! WalletEvent ──► apply_event ──► IdentityChange ──► orchestrator cleanup
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{
    error::{LedgerError, LedgerResult},
    types::Address,
};

/// Notifications pushed by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// The authorized accounts changed; the first one is active.
    AccountsChanged(Vec<Address>),
    /// The provider switched networks.
    ChainChanged(String),
    /// The provider dropped the connection.
    Disconnected,
}

/// Capability interface to a signing wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Asks the wallet to authorize accounts, prompting the user if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UserRejected`] if the user declines.
    async fn request_accounts(&self) -> LedgerResult<Vec<Address>>;

    /// Returns the current chain id as reported by the wallet.
    async fn chain_id(&self) -> LedgerResult<String>;

    /// Returns the balance of `address` as a hex-encoded integer.
    async fn balance(&self, address: &Address) -> LedgerResult<String>;

    /// Subscribes to account and network changes.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// The account bound to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Active signing address.
    pub address: Address,
    /// Network the wallet is on.
    pub chain_id: String,
}

/// What an applied [`WalletEvent`] did to the bound identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    /// The bound account is the same as before.
    Unchanged,
    /// A different account is now bound.
    Switched(Address),
    /// The network changed under the same account.
    ChainSwitched(String),
    /// No account is bound any more.
    Disconnected,
}

/// Connection context binding a wallet provider to an account.
pub struct Session {
    provider: Arc<dyn WalletProvider>,
    account: RwLock<Option<Account>>,
}

impl Session {
    /// Creates a disconnected session over `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self { provider, account: RwLock::new(None) }
    }

    /// Binds an account, prompting the wallet only if none is bound yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UserRejected`] if the user declines and
    /// [`LedgerError::ConnectionUnavailable`] if the wallet authorizes no
    /// account.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self) -> LedgerResult<Account> {
        if let Some(account) = self.account() {
            return Ok(account);
        }

        let accounts = self.provider.request_accounts().await?;
        let address = accounts
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::connection_unavailable("wallet authorized no accounts"))?;
        let chain_id = self.provider.chain_id().await?;

        let mut slot = self.account.write();
        // A concurrent connect may have won; keep its binding.
        let account = slot.get_or_insert(Account { address, chain_id }).clone();
        tracing::info!(
            address = %account.address,
            chain_id = %account.chain_id,
            "wallet connected"
        );
        Ok(account)
    }

    /// Unbinds the account. Idempotent.
    pub fn disconnect(&self) {
        if let Some(account) = self.account.write().take() {
            tracing::info!(address = %account.address, "wallet disconnected");
        }
    }

    /// Returns the bound account, if any.
    #[must_use]
    pub fn account(&self) -> Option<Account> {
        self.account.read().clone()
    }

    /// Returns `true` if an account is bound.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.account.read().is_some()
    }

    /// Returns the signing address.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConnectionUnavailable`] when disconnected.
    pub fn signer(&self) -> LedgerResult<Address> {
        self.account
            .read()
            .as_ref()
            .map(|a| a.address.clone())
            .ok_or_else(|| LedgerError::connection_unavailable("no wallet account is connected"))
    }

    /// Returns the bound account's balance in the chain's smallest unit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConnectionUnavailable`] when disconnected and
    /// [`LedgerError::Decode`] if the wallet reports a malformed balance.
    pub async fn balance(&self) -> LedgerResult<u128> {
        let signer = self.signer()?;
        let raw = self.provider.balance(&signer).await?;
        parse_hex_quantity(&raw)
    }

    /// Subscribes to the provider's events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<WalletEvent> {
        self.provider.subscribe()
    }

    /// Applies a provider event to the bound account.
    ///
    /// Events received while disconnected are ignored, so an account change
    /// never silently reconnects a session the caller tore down.
    pub fn apply_event(&self, event: WalletEvent) -> IdentityChange {
        let mut slot = self.account.write();
        let Some(current) = slot.as_mut() else {
            return IdentityChange::Unchanged;
        };

        let change = match event {
            WalletEvent::AccountsChanged(accounts) => match accounts.into_iter().next() {
                Some(address) if address == current.address => IdentityChange::Unchanged,
                Some(address) => {
                    current.address = address.clone();
                    IdentityChange::Switched(address)
                },
                None => IdentityChange::Disconnected,
            },
            WalletEvent::ChainChanged(chain_id) if chain_id == current.chain_id => {
                IdentityChange::Unchanged
            },
            WalletEvent::ChainChanged(chain_id) => {
                current.chain_id = chain_id.clone();
                IdentityChange::ChainSwitched(chain_id)
            },
            WalletEvent::Disconnected => IdentityChange::Disconnected,
        };
        if change == IdentityChange::Disconnected {
            *slot = None;
        }
        tracing::debug!(?change, "wallet event applied");
        change
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("account", &*self.account.read()).finish_non_exhaustive()
    }
}

/// Parses a `0x`-prefixed hex quantity.
fn parse_hex_quantity(raw: &str) -> LedgerResult<u128> {
    let digits = raw.trim();
    let digits = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits);
    if digits.is_empty() {
        return Err(LedgerError::decode(format!("empty hex quantity: {raw:?}")));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::decode(format!("invalid hex quantity {raw:?}: {e}")))
}
