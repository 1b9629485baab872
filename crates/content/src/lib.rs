//! # Shelfchain Content
//!
//! HTTP implementation of [`ContentStore`](shelfchain_library::ContentStore)
//! for book metadata documents and cover images.
//!
//! This crate provides:
//! - **Gateway reads**: `ipfs://` URIs are read through a configurable
//!   gateway; plain `http(s)` URIs are fetched as-is
//! - **Pinning**: JSON documents and files are pinned through a pinning API
//!   authenticated by an API key and secret
//! - **Secret hygiene**: the API secret is zeroized on drop and redacted
//!   from `Debug` output
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shelfchain_content::{ContentConfig, HttpContentStore};
//! use shelfchain_library::ContentResolver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ContentConfig::builder()
//!     .api_key(std::env::var("PINATA_API_KEY")?)
//!     .api_secret(std::env::var("PINATA_SECRET_API_KEY")?)
//!     .build()?;
//! let resolver = ContentResolver::new(Arc::new(HttpContentStore::new(config)?));
//!
//! let resolution = resolver.resolve(Some("ipfs://bafy...")).await;
//! println!("unavailable: {}", resolution.is_unavailable());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Store configuration.
pub mod config;
/// HTTP error types.
pub mod error;
mod store;

pub use config::{ContentConfig, DEFAULT_GATEWAY_URL, DEFAULT_PINNING_URL, DEFAULT_TIMEOUT};
pub use error::{HttpContentError, HttpResult};
pub use store::HttpContentStore;
