//! Configuration for [`LibraryService`](crate::LibraryService).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of content documents fetched concurrently per batch.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Default lifetime of a cached role snapshot (30 seconds).
pub const DEFAULT_ROLE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Tuning for reconciliation and role caching.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use shelfchain_library::LibraryConfig;
///
/// let config = LibraryConfig::builder()
///     .fetch_concurrency(4)
///     .role_cache_ttl(Duration::from_secs(10))
///     .build()?;
/// assert_eq!(config.fetch_concurrency(), 4);
/// # Ok::<(), shelfchain_library::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    #[serde(default = "default_fetch_concurrency")]
    fetch_concurrency: usize,

    #[serde(with = "humantime_serde", default = "default_role_cache_ttl")]
    role_cache_ttl: Duration,
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

fn default_role_cache_ttl() -> Duration {
    DEFAULT_ROLE_CACHE_TTL
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            role_cache_ttl: DEFAULT_ROLE_CACHE_TTL,
        }
    }
}

#[bon::bon]
impl LibraryConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `fetch_concurrency` is zero or
    /// `role_cache_ttl` is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_FETCH_CONCURRENCY)] fetch_concurrency: usize,
        #[builder(default = DEFAULT_ROLE_CACHE_TTL)] role_cache_ttl: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { fetch_concurrency, role_cache_ttl };
        config.validate()?;
        Ok(config)
    }
}

impl LibraryConfig {
    /// Checks a configuration obtained through deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "fetch_concurrency",
                min: "1".into(),
                value: self.fetch_concurrency.to_string(),
            });
        }
        if self.role_cache_ttl.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "role_cache_ttl",
                value: format!("{:?}", self.role_cache_ttl),
            });
        }
        Ok(())
    }

    /// Maximum number of concurrent content fetches per batch.
    #[must_use]
    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency
    }

    /// Lifetime of a cached role snapshot.
    #[must_use]
    pub fn role_cache_ttl(&self) -> Duration {
        self.role_cache_ttl
    }
}
