//! Merging raw ledger records with their metadata documents.
//!
//! # Field precedence
//!
//! | Field | Source order | Default |
//! |-------|--------------|---------|
//! | `title` | document, ledger | `"Untitled"` |
//! | `author` | document, ledger | `"Unknown"` |
//! | `description`, `isbn`, `genre`, `cover_image` | document, ledger | `""` |
//! | `quantity` | ledger, document | `0` |
//! | `available_copies` | ledger, document, `quantity` | - |
//!
//! A field is taken from the first source where it is present, even if the
//! present value is an empty string. The ledger owns copy counts; the
//! document only fills gaps.
//!
//! `available_copies` is clamped into `[0, quantity]`. A record whose `id`,
//! `title` or `cover_image` is empty after merging is dropped and counted.

use futures::{StreamExt, stream};

use crate::{
    config::DEFAULT_FETCH_CONCURRENCY,
    content::{ContentResolver, Resolution},
    error::{LibraryError, LibraryResult},
    types::{Book, BookDocument, LedgerBook},
};

/// Title used when neither source has one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Author used when neither source has one.
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Derived copy counts of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyCounts {
    /// Total copies.
    pub quantity: u64,
    /// Copies on the shelf, within `[0, quantity]`.
    pub available: u64,
    /// `true` if the reported availability exceeded the quantity.
    pub clamped: bool,
}

impl CopyCounts {
    /// Copies currently on loan.
    #[must_use]
    pub fn borrowed(&self) -> u64 {
        self.quantity - self.available
    }
}

/// Derives copy counts from a ledger record and, optionally, its document.
#[must_use]
pub fn copy_counts(record: &LedgerBook, document: Option<&BookDocument>) -> CopyCounts {
    let quantity = record.quantity.or(document.and_then(|d| d.quantity)).unwrap_or(0);
    let reported =
        record.available.or(document.and_then(|d| d.available_copies)).unwrap_or(quantity);
    CopyCounts { quantity, available: reported.min(quantity), clamped: reported > quantity }
}

fn pick(doc: Option<&Option<String>>, ledger: &Option<String>, default: &str) -> String {
    doc.and_then(Option::as_ref)
        .or(ledger.as_ref())
        .map_or_else(|| default.to_owned(), Clone::clone)
}

/// Merges one ledger record with its resolved document.
///
/// Returns `None` if the merged record lacks an `id`, `title` or
/// `cover_image`. The result depends only on the inputs.
#[must_use]
pub fn merge(record: &LedgerBook, resolution: &Resolution) -> Option<Book> {
    let doc = resolution.document();
    let counts = copy_counts(record, doc);
    if counts.clamped {
        tracing::warn!(
            book_id = %record.id,
            quantity = counts.quantity,
            available = counts.available,
            "available copies exceed quantity, clamping",
        );
    }

    let book = Book {
        id: record.id.clone(),
        title: pick(doc.map(|d| &d.title), &record.title, DEFAULT_TITLE),
        author: pick(doc.map(|d| &d.author), &record.author, DEFAULT_AUTHOR),
        description: pick(doc.map(|d| &d.description), &record.description, ""),
        cover_image: pick(doc.map(|d| &d.cover_image), &record.cover_image, ""),
        isbn: pick(doc.map(|d| &d.isbn), &record.isbn, ""),
        genre: pick(doc.map(|d| &d.genre), &record.genre, ""),
        quantity: counts.quantity,
        available_copies: counts.available,
        metadata_uri: record.metadata_uri.clone().unwrap_or_default(),
        borrowers: record.borrowers.clone(),
        metadata_error: resolution.is_unavailable(),
    };

    if book.id.is_empty() || book.title.is_empty() || book.cover_image.is_empty() {
        tracing::warn!(book_id = %book.id, "dropping incomplete book record");
        return None;
    }
    Some(book)
}

/// Result of reconciling one batch of ledger records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Reconciled books, in ledger order.
    pub books: Vec<Book>,
    /// Records dropped for missing required fields.
    pub skipped_books: usize,
    /// Records whose metadata could not be fetched or parsed.
    pub metadata_errors: usize,
}

/// Resolves and merges ledger records.
#[derive(Debug, Clone)]
pub struct Reconciler {
    resolver: ContentResolver,
    fetch_concurrency: usize,
}

impl Reconciler {
    /// Creates a reconciler fetching at most `fetch_concurrency` documents
    /// at once. A concurrency of zero is treated as the default.
    #[must_use]
    pub fn new(resolver: ContentResolver, fetch_concurrency: usize) -> Self {
        let fetch_concurrency =
            if fetch_concurrency == 0 { DEFAULT_FETCH_CONCURRENCY } else { fetch_concurrency };
        Self { resolver, fetch_concurrency }
    }

    /// Resolves and merges a batch.
    ///
    /// Documents are fetched concurrently; the output keeps ledger order.
    #[tracing::instrument(skip_all, fields(records = records.len()))]
    pub async fn merge_all(&self, records: Vec<LedgerBook>) -> BatchReport {
        let resolved: Vec<(LedgerBook, Resolution)> = stream::iter(records)
            .map(|record| async move {
                let resolution = self.resolver.resolve(record.metadata_uri.as_deref()).await;
                (record, resolution)
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (record, resolution) in &resolved {
            if resolution.is_unavailable() {
                report.metadata_errors += 1;
            }
            match merge(record, resolution) {
                Some(book) => report.books.push(book),
                None => report.skipped_books += 1,
            }
        }

        if report.skipped_books > 0 || report.metadata_errors > 0 {
            tracing::warn!(
                skipped_books = report.skipped_books,
                metadata_errors = report.metadata_errors,
                "batch reconciled with gaps",
            );
        }
        report
    }

    /// Resolves and merges a single record.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::RecordIncomplete`] if the record is dropped.
    pub async fn merge_one(&self, record: LedgerBook) -> LibraryResult<Book> {
        let resolution = self.resolver.resolve(record.metadata_uri.as_deref()).await;
        merge(&record, &resolution).ok_or(LibraryError::RecordIncomplete { id: record.id })
    }

    /// Resolves a record's document and derives its copy counts the same
    /// way [`merge`] does.
    ///
    /// Unlike [`merge_one`](Self::merge_one), a record missing display
    /// fields still yields counts.
    pub async fn counts(&self, record: &LedgerBook) -> CopyCounts {
        let resolution = self.resolver.resolve(record.metadata_uri.as_deref()).await;
        copy_counts(record, resolution.document())
    }
}
