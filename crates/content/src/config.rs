//! Configuration for the HTTP content store.

use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer};
use shelfchain_library::ConfigError;
use zeroize::Zeroizing;

/// Default public gateway documents are read through.
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.pinata.cloud";

/// Default pinning API base.
pub const DEFAULT_PINNING_URL: &str = "https://api.pinata.cloud/pinning";

/// Default per-request timeout (6 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

/// Configuration for [`HttpContentStore`](crate::HttpContentStore).
///
/// The API secret is held in [`Zeroizing`] and scrubbed from memory when the
/// configuration is dropped. It never appears in `Debug` output.
///
/// # Example
///
/// ```
/// use shelfchain_content::ContentConfig;
///
/// let config = ContentConfig::builder()
///     .api_key("key")
///     .api_secret("secret")
///     .build()?;
/// assert_eq!(config.gateway_url(), "https://gateway.pinata.cloud");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentConfig {
    /// Gateway base URL used to read `ipfs://` documents and to build the
    /// URIs of published content.
    #[serde(default = "default_gateway_url")]
    pub(crate) gateway_url: String,

    /// Pinning API base URL.
    #[serde(default = "default_pinning_url")]
    pub(crate) pinning_url: String,

    /// Pinning API key.
    pub(crate) api_key: String,

    /// Pinning API secret.
    #[serde(deserialize_with = "secret")]
    pub(crate) api_secret: Zeroizing<String>,

    /// Per-request timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub(crate) timeout: Duration,
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_owned()
}

fn default_pinning_url() -> String {
    DEFAULT_PINNING_URL.to_owned()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn secret<'de, D: Deserializer<'de>>(d: D) -> Result<Zeroizing<String>, D::Error> {
    String::deserialize(d).map(Zeroizing::new)
}

#[bon::bon]
impl ContentConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if either URL is not an absolute
    /// `http(s)` URL or a credential is empty, and
    /// [`ConfigError::MustBePositive`] if `timeout` is zero.
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_GATEWAY_URL.to_owned())] gateway_url: String,
        #[builder(into, default = DEFAULT_PINNING_URL.to_owned())] pinning_url: String,
        #[builder(into)] api_key: String,
        #[builder(into)] api_secret: String,
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            gateway_url,
            pinning_url,
            api_key,
            api_secret: Zeroizing::new(api_secret),
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// See [`ContentConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("gateway_url", &self.gateway_url)?;
        validate_url("pinning_url", &self.pinning_url)?;
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "api_key", message: "empty".into() });
        }
        if self.api_secret.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "api_secret", message: "empty".into() });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "timeout",
                value: format!("{:?}", self.timeout),
            });
        }
        Ok(())
    }

    /// Gateway base URL, without a trailing slash.
    #[must_use]
    pub fn gateway_url(&self) -> &str {
        self.gateway_url.trim_end_matches('/')
    }

    /// Pinning API base URL, without a trailing slash.
    #[must_use]
    pub fn pinning_url(&self) -> &str {
        self.pinning_url.trim_end_matches('/')
    }

    /// Pinning API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Pinning API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for ContentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentConfig")
            .field("gateway_url", &self.gateway_url)
            .field("pinning_url", &self.pinning_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn validate_url(field: &'static str, raw: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ConfigError::Invalid { field, message: e.to_string() })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => {
            Err(ConfigError::Invalid { field, message: format!("unsupported scheme {scheme}") })
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContentConfig::builder().api_key("k").api_secret("s").build().unwrap();
        assert_eq!(config.gateway_url(), DEFAULT_GATEWAY_URL);
        assert_eq!(config.pinning_url(), DEFAULT_PINNING_URL);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = ContentConfig::builder()
            .gateway_url("http://127.0.0.1:9000/")
            .api_key("k")
            .api_secret("s")
            .build()
            .unwrap();
        assert_eq!(config.gateway_url(), "http://127.0.0.1:9000");
    }

    #[rstest]
    #[case::bad_gateway("ftp://gateway", "https://pin", "k", "s", "gateway_url")]
    #[case::relative_pinning("https://gw", "/pinning", "k", "s", "pinning_url")]
    #[case::empty_key("https://gw", "https://pin", " ", "s", "api_key")]
    #[case::empty_secret("https://gw", "https://pin", "k", "", "api_secret")]
    fn test_invalid_fields(
        #[case] gateway: &str,
        #[case] pinning: &str,
        #[case] key: &str,
        #[case] secret: &str,
        #[case] expected: &str,
    ) {
        let err = ContentConfig::builder()
            .gateway_url(gateway)
            .pinning_url(pinning)
            .api_key(key)
            .api_secret(secret)
            .build()
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == expected),
            "got {err:?}"
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ContentConfig::builder()
            .api_key("k")
            .api_secret("s")
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MustBePositive { field: "timeout", .. }));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config =
            ContentConfig::builder().api_key("k").api_secret("hunter2").build().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let config: ContentConfig = serde_json::from_value(serde_json::json!({
            "api_key": "k",
            "api_secret": "s",
            "timeout": "2s",
        }))
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.api_secret(), "s");
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result = serde_json::from_value::<ContentConfig>(serde_json::json!({
            "api_key": "k",
            "api_secret": "s",
            "jwt": "x",
        }));
        assert!(result.is_err());
    }
}
