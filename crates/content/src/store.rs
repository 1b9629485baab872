//! [`ContentStore`] over an IPFS gateway and a pinning API.
//!
//! ```text
//! fetch("ipfs://<cid>")      ──► GET  <gateway>/ipfs/<cid>
//! fetch("https://...")       ──► GET  https://...
//! publish_json(doc)          ──► POST <pinning>/pinJSONToIPFS   (JSON body)
//! publish_bytes(name, data)  ──► POST <pinning>/pinFileToIPFS   (multipart "file")
//!                                 └─► { "IpfsHash": h }  ──► <gateway>/ipfs/<h>
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, multipart};
use serde::Deserialize;
use shelfchain_library::{ConfigError, ContentResult, ContentStore};

use crate::{
    config::ContentConfig,
    error::{HttpContentError, HttpResult},
};

const IPFS_SCHEME: &str = "ipfs://";
const API_KEY_HEADER: &str = "pinata_api_key";
const API_SECRET_HEADER: &str = "pinata_secret_api_key";

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// HTTP-backed content store.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use shelfchain_content::{ContentConfig, HttpContentStore};
/// use shelfchain_library::ContentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ContentConfig::builder().api_key("key").api_secret("secret").build()?;
/// let store = HttpContentStore::new(config)?;
///
/// let uri = store.publish_json(&serde_json::json!({ "title": "Dune" })).await?;
/// let bytes = store.fetch(&uri).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpContentStore {
    http: Client,
    config: ContentConfig,
}

impl HttpContentStore {
    /// Creates a store from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: ContentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid { field: "http_client", message: e.to_string() })?;
        Ok(Self { http, config })
    }

    /// The store's configuration.
    #[must_use]
    pub fn config(&self) -> &ContentConfig {
        &self.config
    }

    /// Maps a content URI to the URL it is fetched from.
    ///
    /// # Errors
    ///
    /// Returns [`HttpContentError::UnsupportedUri`] for schemes other than
    /// `ipfs`, `http` and `https`.
    pub fn resolve_url(&self, uri: &str) -> HttpResult<String> {
        let uri = uri.trim();
        if let Some(cid) = uri.strip_prefix(IPFS_SCHEME) {
            return Ok(self.gateway_uri(cid.trim_start_matches('/')));
        }
        match reqwest::Url::parse(uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url.into()),
            _ => Err(HttpContentError::UnsupportedUri { uri: uri.to_owned() }),
        }
    }

    fn gateway_uri(&self, cid: &str) -> String {
        format!("{}/ipfs/{cid}", self.config.gateway_url())
    }

    fn pin_request(&self, endpoint: &str) -> RequestBuilder {
        self.http
            .post(format!("{}/{endpoint}", self.config.pinning_url()))
            .header(API_KEY_HEADER, self.config.api_key())
            .header(API_SECRET_HEADER, self.config.api_secret())
    }

    async fn get(&self, uri: &str) -> HttpResult<Bytes> {
        let url = self.resolve_url(uri)?;
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn pin(&self, request: RequestBuilder) -> HttpResult<String> {
        let response = request.send().await?.error_for_status()?;
        let body = response.bytes().await?;
        let pinned: PinResponse = serde_json::from_slice(&body)
            .map_err(|e| HttpContentError::Decode { message: e.to_string() })?;
        if pinned.ipfs_hash.trim().is_empty() {
            return Err(HttpContentError::Decode { message: "empty IpfsHash".into() });
        }
        Ok(self.gateway_uri(&pinned.ipfs_hash))
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, uri: &str) -> ContentResult<Bytes> {
        let bytes = self.get(uri).await.map_err(|e| e.into_fetch_error(uri))?;
        tracing::debug!(len = bytes.len(), "content fetched");
        Ok(bytes)
    }

    #[tracing::instrument(skip_all)]
    async fn publish_json(&self, document: &serde_json::Value) -> ContentResult<String> {
        let uri = self
            .pin(self.pin_request("pinJSONToIPFS").json(document))
            .await
            .map_err(HttpContentError::into_publish_error)?;
        tracing::info!(%uri, "document pinned");
        Ok(uri)
    }

    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn publish_bytes(&self, file_name: &str, bytes: Bytes) -> ContentResult<String> {
        let part = multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_owned());
        let form = multipart::Form::new().part("file", part);
        let uri = self
            .pin(self.pin_request("pinFileToIPFS").multipart(form))
            .await
            .map_err(HttpContentError::into_publish_error)?;
        tracing::info!(%uri, "file pinned");
        Ok(uri)
    }
}

impl std::fmt::Debug for HttpContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContentStore").field("config", &self.config).finish_non_exhaustive()
    }
}
