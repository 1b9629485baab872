//! Single-flight submission of ledger writes.
//!
//! Every write is keyed by a [`FlightKey`] (signing identity plus logical
//! operation). While a flight is pending, a second submission with the same
//! key joins it instead of prompting for another signature:
//!
//! ```text
//! submit(key) ──► map lookup (under lock)
//!                   ├─ Settled   ──► return retained receipt
//!                   ├─ InFlight  ──► await the shared outcome
//!                   └─ vacant    ──► insert InFlight{generation}, run op
//!                                         │
//!                    outcome ◄────────────┘
//!                      ├─ Err                          ──► remove entry
//!                      ├─ Ok + UntilSettled            ──► remove entry
//!                      └─ Ok + UntilIdentityChanges    ──► keep as Settled
//! ```
//!
//! Settling only touches the entry if its generation still matches, so a
//! flight that was cleared and replaced never clobbers its successor.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;

use crate::{
    error::LibraryResult,
    types::{Address, TxReceipt},
};

/// Identity of a logical write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlightKey {
    identity: Address,
    operation: String,
}

impl FlightKey {
    /// Creates a key for `operation` signed by `identity`.
    #[must_use]
    pub fn new(identity: Address, operation: impl Into<String>) -> Self {
        Self { identity, operation: operation.into() }
    }

    /// The signing identity.
    #[must_use]
    pub fn identity(&self) -> &Address {
        &self.identity
    }

    /// The logical operation.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// How long a successful flight keeps its key occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Free the key once the flight settles.
    UntilSettled,
    /// Keep returning the receipt until the identity changes.
    UntilIdentityChanges,
}

type SharedOutcome = Shared<BoxFuture<'static, LibraryResult<TxReceipt>>>;

enum Flight {
    InFlight { generation: u64, outcome: SharedOutcome },
    Settled { receipt: TxReceipt },
}

type FlightMap = Arc<Mutex<HashMap<FlightKey, Flight>>>;

/// Per-key single-flight guard for ledger writes.
#[derive(Default)]
pub struct TransactionOrchestrator {
    flights: FlightMap,
    next_generation: AtomicU64,
}

impl TransactionOrchestrator {
    /// Creates an orchestrator with no flights.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` unless a flight for `key` already exists.
    ///
    /// `operation` is invoked at most once per flight, and only when this
    /// call starts the flight. Joined callers receive a clone of the same
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns whatever error the flight settled with.
    #[tracing::instrument(
        skip(self, key, operation),
        fields(identity = %key.identity, operation = %key.operation)
    )]
    pub async fn submit<F, Fut>(
        &self,
        key: FlightKey,
        retention: Retention,
        operation: F,
    ) -> LibraryResult<TxReceipt>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LibraryResult<TxReceipt>> + Send + 'static,
    {
        let outcome = {
            let mut flights = self.flights.lock();
            match flights.get(&key) {
                Some(Flight::Settled { receipt }) => {
                    tracing::debug!("returning retained receipt");
                    return Ok(receipt.clone());
                },
                Some(Flight::InFlight { outcome, .. }) => {
                    tracing::debug!("joining in-flight submission");
                    outcome.clone()
                },
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let outcome = settle_after(
                        Arc::clone(&self.flights),
                        key.clone(),
                        generation,
                        retention,
                        operation(),
                    );
                    flights.insert(key, Flight::InFlight { generation, outcome: outcome.clone() });
                    outcome
                },
            }
        };
        outcome.await
    }

    /// Returns `true` if a flight for `key` is pending.
    #[must_use]
    pub fn is_in_flight(&self, key: &FlightKey) -> bool {
        matches!(self.flights.lock().get(key), Some(Flight::InFlight { .. }))
    }

    /// Returns `true` if `key` holds a retained receipt.
    #[must_use]
    pub fn is_retained(&self, key: &FlightKey) -> bool {
        matches!(self.flights.lock().get(key), Some(Flight::Settled { .. }))
    }

    /// Drops every entry belonging to an identity other than `identity`.
    pub fn retain_identity(&self, identity: &Address) {
        let mut flights = self.flights.lock();
        let before = flights.len();
        flights.retain(|key, _| &key.identity == identity);
        let dropped = before - flights.len();
        if dropped > 0 {
            tracing::debug!(%identity, dropped, "dropped flights of previous identity");
        }
    }

    /// Drops every entry. Pending flights keep running for callers that
    /// already hold them, but new submissions start fresh.
    pub fn clear(&self) {
        self.flights.lock().clear();
    }
}

fn settle_after<Fut>(
    flights: FlightMap,
    key: FlightKey,
    generation: u64,
    retention: Retention,
    operation: Fut,
) -> SharedOutcome
where
    Fut: Future<Output = LibraryResult<TxReceipt>> + Send + 'static,
{
    async move {
        let outcome = operation.await;
        let mut map = flights.lock();
        let current = matches!(
            map.get(&key),
            Some(Flight::InFlight { generation: g, .. }) if *g == generation
        );
        if current {
            match (&outcome, retention) {
                (Ok(receipt), Retention::UntilIdentityChanges) => {
                    map.insert(key, Flight::Settled { receipt: receipt.clone() });
                },
                _ => {
                    map.remove(&key);
                },
            }
        }
        outcome
    }
    .boxed()
    .shared()
}

impl std::fmt::Debug for TransactionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionOrchestrator")
            .field("flights", &self.flights.lock().len())
            .finish_non_exhaustive()
    }
}
