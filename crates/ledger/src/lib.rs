//! JSON-RPC implementation of [`LedgerClient`](shelfchain_library::LedgerClient)
//! for the Shelfchain library ledger.
//!
//! This crate provides [`RpcLedger`], which talks to a ledger node over
//! JSON-RPC 2.0 on HTTP. Reads are retried with exponential backoff and
//! bounded by an overall deadline; writes are submitted once and resolve
//! only after the ledger reports the transaction included.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 shelfchain-library                          │
//! │      LibraryService │ RoleAuthority │ Orchestrator          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RpcLedger                                │
//! │           (implements LedgerClient trait)                   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │   reads: retry + deadline    │  writes: submit + poll       │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                  JSON-RPC over HTTP (reqwest)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires a running ledger node.
//! use std::sync::Arc;
//! use shelfchain_ledger::{RpcLedger, RpcLedgerConfig};
//! use shelfchain_library::{LibraryConfig, LibraryService, MemoryContentStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RpcLedgerConfig::builder()
//!         .endpoint("http://localhost:8545")
//!         .contract("0x5fbdb2315678afecb367f032d93f642f64180aa3")
//!         .build()?;
//!
//!     let service = LibraryService::new(
//!         Arc::new(RpcLedger::new(config)?),
//!         Arc::new(MemoryContentStore::new()),
//!         LibraryConfig::default(),
//!     );
//!
//!     let report = service.get_books().await?;
//!     println!("{} books", report.books.len());
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! JSON-RPC and HTTP failures are captured as [`RpcError`] and converted
//! into [`LedgerError`](shelfchain_library::LedgerError); see the [`error`]
//! module for the code table.
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Enables `fail` fail-points (`retry-before-sleep`, `rpc-receipt-poll`) for
//!   fault-injection tests.

#![deny(unsafe_code)]

mod client;
pub mod config;
pub mod error;
mod retry;

pub use client::RpcLedger;
pub use config::{RetryConfig, RpcLedgerConfig};
pub use error::{RpcError, RpcErrorObject, RpcResult};
