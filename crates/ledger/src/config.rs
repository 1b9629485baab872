//! Configuration for the JSON-RPC ledger client.
//!
//! This module provides [`RpcLedgerConfig`], which locates the ledger
//! endpoint and contract and bounds every network wait, and
//! [`RetryConfig`], which shapes the backoff applied to reads.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelfchain_library::{Address, ConfigError};

/// Default per-request timeout (10 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall bound on a read including retries (30 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait for a transaction to be included (120 seconds).
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls (1 second).
pub const DEFAULT_CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of read retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff before the first read retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default ceiling on read backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Backoff policy for transient read failures.
///
/// Writes are never retried; a resubmitted write could execute twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retrying.
    #[serde(default = "default_max_retries")]
    pub(crate) max_retries: u32,

    /// Delay before the first retry; doubles per attempt.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub(crate) initial_backoff: Duration,

    /// Upper bound on the delay before jitter.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub(crate) max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[bon::bon]
impl RetryConfig {
    /// Creates a retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] if `initial_backoff` is zero
    /// and [`ConfigError::BelowMinimum`] if `max_backoff` is shorter than
    /// `initial_backoff`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_retries, initial_backoff, max_backoff };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces. Deserialized values skip
    /// the builder, so callers validate them explicitly.
    ///
    /// # Errors
    ///
    /// See [`RetryConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_backoff.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "initial_backoff",
                value: format!("{:?}", self.initial_backoff),
            });
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::BelowMinimum {
                field: "max_backoff",
                min: format!("{:?}", self.initial_backoff),
                value: format!("{:?}", self.max_backoff),
            });
        }
        Ok(())
    }

    /// Retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Upper bound on the delay before jitter.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

/// Configuration for [`RpcLedger`](crate::RpcLedger).
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use shelfchain_ledger::RpcLedgerConfig;
///
/// let config = RpcLedgerConfig::builder()
///     .endpoint("http://localhost:8545")
///     .contract("0x5fbdb2315678afecb367f032d93f642f64180aa3")
///     .confirmation_timeout(Duration::from_secs(60))
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcLedgerConfig {
    /// JSON-RPC endpoint URL.
    pub(crate) endpoint: String,

    /// Address of the library contract.
    pub(crate) contract: Address,

    /// Per-request timeout.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub(crate) request_timeout: Duration,

    /// Overall bound on a read, retries and backoff included.
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub(crate) read_timeout: Duration,

    /// How long a write may wait for inclusion.
    #[serde(with = "humantime_serde", default = "default_confirmation_timeout")]
    pub(crate) confirmation_timeout: Duration,

    /// Interval between receipt polls.
    #[serde(with = "humantime_serde", default = "default_confirmation_poll_interval")]
    pub(crate) confirmation_poll_interval: Duration,

    /// Read retry policy.
    #[serde(default)]
    pub(crate) retry: RetryConfig,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_confirmation_timeout() -> Duration {
    DEFAULT_CONFIRMATION_TIMEOUT
}

fn default_confirmation_poll_interval() -> Duration {
    DEFAULT_CONFIRMATION_POLL_INTERVAL
}

#[bon::bon]
impl RpcLedgerConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `request_timeout` - Per-request timeout (default: 10 seconds).
    /// * `read_timeout` - Overall read bound (default: 30 seconds).
    /// * `confirmation_timeout` - Inclusion wait (default: 120 seconds).
    /// * `confirmation_poll_interval` - Receipt poll interval (default: 1 second).
    /// * `retry` - Read retry policy (default: [`RetryConfig::default`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the endpoint is not an HTTP(S) URL, the
    /// contract address is empty, or any duration is zero.
    #[builder]
    pub fn new(
        #[builder(into)] endpoint: String,
        #[builder(into)] contract: Address,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] request_timeout: Duration,
        #[builder(default = DEFAULT_READ_TIMEOUT)] read_timeout: Duration,
        #[builder(default = DEFAULT_CONFIRMATION_TIMEOUT)] confirmation_timeout: Duration,
        #[builder(default = DEFAULT_CONFIRMATION_POLL_INTERVAL)] confirmation_poll_interval: Duration,
        #[builder(default)] retry: RetryConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            endpoint,
            contract,
            request_timeout,
            read_timeout,
            confirmation_timeout,
            confirmation_poll_interval,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// See [`RpcLedgerConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::Invalid { field: "endpoint", message: e.to_string() })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "endpoint",
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.contract.as_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "contract",
                message: "address cannot be empty".into(),
            });
        }
        for (field, value) in [
            ("request_timeout", self.request_timeout),
            ("read_timeout", self.read_timeout),
            ("confirmation_timeout", self.confirmation_timeout),
            ("confirmation_poll_interval", self.confirmation_poll_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::MustBePositive { field, value: format!("{value:?}") });
            }
        }
        self.retry.validate()
    }

    /// JSON-RPC endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Address of the library contract.
    #[must_use]
    pub fn contract(&self) -> &Address {
        &self.contract
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Overall bound on a read.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// How long a write may wait for inclusion.
    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    /// Interval between receipt polls.
    #[must_use]
    pub fn confirmation_poll_interval(&self) -> Duration {
        self.confirmation_poll_interval
    }

    /// Read retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}
