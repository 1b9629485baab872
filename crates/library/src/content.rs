//! Content store abstraction and the metadata resolver.
//!
//! A [`ContentStore`] fetches and publishes raw documents. The
//! [`ContentResolver`] sits on top of it and turns a metadata URI into a
//! [`Resolution`]. Read failures never escape the resolver: they are logged
//! and reported as [`Resolution::Unavailable`] so that one unreachable
//! document cannot fail a whole batch.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::{ContentError, ContentResult},
    types::BookDocument,
};

/// Off-chain storage for metadata documents and cover images.
///
/// Implementations must be safe to share across tasks; the reconciler
/// issues fetches concurrently.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetches the raw bytes stored at `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Unavailable`] if the document cannot be
    /// fetched and [`ContentError::InvalidUri`] if the scheme is unsupported.
    async fn fetch(&self, uri: &str) -> ContentResult<Bytes>;

    /// Publishes a JSON document and returns its URI.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Publish`] if the store rejects the document.
    async fn publish_json(&self, document: &serde_json::Value) -> ContentResult<String>;

    /// Publishes a file and returns its URI.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Publish`] if the store rejects the file.
    async fn publish_bytes(&self, file_name: &str, bytes: Bytes) -> ContentResult<String>;
}

/// Outcome of resolving a metadata URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The document was fetched and parsed.
    Document(BookDocument),
    /// The record has no metadata URI; nothing was fetched.
    Empty,
    /// Fetching or parsing failed.
    Unavailable,
}

impl Resolution {
    /// Returns the document, if one was resolved.
    #[must_use]
    pub fn document(&self) -> Option<&BookDocument> {
        match self {
            Self::Document(doc) => Some(doc),
            Self::Empty | Self::Unavailable => None,
        }
    }

    /// Returns `true` if the fetch or parse failed.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Fetches and parses book metadata documents.
#[derive(Clone)]
pub struct ContentResolver {
    store: Arc<dyn ContentStore>,
}

impl ContentResolver {
    /// Creates a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Resolves a metadata URI.
    ///
    /// Absent or blank URIs resolve to [`Resolution::Empty`] without a fetch.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, uri: Option<&str>) -> Resolution {
        let Some(uri) = uri.map(str::trim).filter(|u| !u.is_empty()) else {
            return Resolution::Empty;
        };

        match self.fetch_document(uri).await {
            Ok(doc) => Resolution::Document(doc),
            Err(err) => {
                tracing::warn!(uri, error = %err, "metadata document unavailable");
                Resolution::Unavailable
            },
        }
    }

    async fn fetch_document(&self, uri: &str) -> ContentResult<BookDocument> {
        let bytes = self.store.fetch(uri).await?;
        serde_json::from_slice(&bytes).map_err(|e| ContentError::parse(uri, e.to_string()))
    }
}

impl std::fmt::Debug for ContentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryContentStore;

    fn resolver(store: &Arc<MemoryContentStore>) -> ContentResolver {
        ContentResolver::new(Arc::clone(store) as Arc<dyn ContentStore>)
    }

    #[tokio::test]
    async fn test_empty_uri_skips_fetch() {
        let store = Arc::new(MemoryContentStore::new());
        let resolver = resolver(&store);

        assert_eq!(resolver.resolve(None).await, Resolution::Empty);
        assert_eq!(resolver.resolve(Some("  ")).await, Resolution::Empty);
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_resolves_document() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert_json("mem://doc", &json!({ "title": "Foo", "coverImage": "https://img" }));

        let resolution = resolver(&store).resolve(Some("mem://doc")).await;
        let doc = resolution.document().expect("document");
        assert_eq!(doc.title.as_deref(), Some("Foo"));
        assert_eq!(doc.cover_image.as_deref(), Some("https://img"));
    }

    #[tokio::test]
    async fn test_missing_document_is_unavailable() {
        let store = Arc::new(MemoryContentStore::new());
        let resolution = resolver(&store).resolve(Some("mem://missing")).await;
        assert!(resolution.is_unavailable());
    }

    #[tokio::test]
    async fn test_unparseable_document_is_unavailable() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert_raw("mem://bad", Bytes::from_static(b"<html>gateway error</html>"));
        let resolution = resolver(&store).resolve(Some("mem://bad")).await;
        assert!(resolution.is_unavailable());

        store.insert_raw("mem://array", Bytes::from_static(b"[1, 2, 3]"));
        let resolution = resolver(&store).resolve(Some("mem://array")).await;
        assert!(resolution.is_unavailable());
    }
}
