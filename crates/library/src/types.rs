//! Identifiers, raw ledger records and canonical view types.
//!
//! Raw records ([`LedgerBook`], [`LedgerLogEntry`], [`BookDocument`]) mirror
//! what the ledger and the content store actually return and tolerate
//! missing or mistyped fields. Canonical types ([`Book`], [`BorrowHistory`])
//! are only ever produced by the reconciler and the history composer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger-assigned book identifier.
///
/// The ledger numbers books, but identifiers are carried as strings so that
/// records with a missing or malformed id can still be represented and then
/// dropped by the reconciler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for BookId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for BookId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for BookId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An account address, normalized to lowercase.
///
/// Addresses compare by exact equality of the normalized form, so
/// `0xAbC` and `0xabc` are the same account.
///
/// # Examples
///
/// ```
/// use shelfchain_library::Address;
///
/// assert_eq!(Address::parse(" 0xAbCd "), Address::parse("0xabcd"));
/// assert_eq!(Address::parse("0xAbCd").as_str(), "0xabcd");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Normalizes an address: surrounding whitespace is trimmed and hex
    /// digits are lowercased.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    /// Returns the normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of a submitted ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Wraps a transaction hash.
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmation of a transaction included in the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    /// Hash of the confirmed transaction.
    pub tx_hash: TxHash,
    /// Block (or sequence number) that included it, when reported.
    #[serde(default, deserialize_with = "lenient::count")]
    pub block_number: Option<u64>,
}

/// One outstanding loan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrower {
    /// Address holding the copy.
    pub address: Address,
    /// When the copy was borrowed, carried as unix seconds on the wire.
    /// An unreadable date degrades to the unix epoch.
    #[serde(
        default,
        serialize_with = "chrono::serde::ts_seconds::serialize",
        deserialize_with = "lenient::timestamp"
    )]
    pub borrow_date: DateTime<Utc>,
}

/// A book record exactly as the ledger returns it.
///
/// Every field is optional or lenient: a malformed value degrades to
/// "absent" rather than failing the whole batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBook {
    /// Ledger-assigned id; empty when the ledger omitted it.
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: BookId,
    /// Pointer to the metadata document in the content store.
    #[serde(default, alias = "metadataURI", deserialize_with = "lenient::text")]
    pub metadata_uri: Option<String>,
    /// Title recorded on the ledger, if any.
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: Option<String>,
    /// Author recorded on the ledger, if any.
    #[serde(default, deserialize_with = "lenient::text")]
    pub author: Option<String>,
    /// Description recorded on the ledger, if any.
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    /// ISBN recorded on the ledger, if any.
    #[serde(default, deserialize_with = "lenient::text")]
    pub isbn: Option<String>,
    /// Genre recorded on the ledger, if any.
    #[serde(default, deserialize_with = "lenient::text")]
    pub genre: Option<String>,
    /// Cover image URI recorded on the ledger, if any.
    #[serde(default, deserialize_with = "lenient::text")]
    pub cover_image: Option<String>,
    /// Total copies.
    #[serde(default, deserialize_with = "lenient::count")]
    pub quantity: Option<u64>,
    /// Copies on the shelf.
    #[serde(default, deserialize_with = "lenient::count")]
    pub available: Option<u64>,
    /// Outstanding loans in ledger order. Entries without a readable
    /// address are dropped.
    #[serde(default, deserialize_with = "lenient::entries")]
    pub borrowers: Vec<Borrower>,
}

/// A borrow log entry exactly as the ledger returns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerLogEntry {
    /// Book the entry refers to.
    #[serde(deserialize_with = "lenient::id")]
    pub book_id: BookId,
    /// Borrowing account.
    pub borrower: Address,
    /// Borrow time in unix seconds.
    #[serde(default, deserialize_with = "lenient::seconds")]
    pub timestamp: i64,
    /// Whether the copy has been returned.
    #[serde(default)]
    pub returned: bool,
    /// Return time in unix seconds, when the ledger records it.
    #[serde(default, deserialize_with = "lenient::optional_seconds")]
    pub return_timestamp: Option<i64>,
    /// Transaction that recorded the borrow, when known.
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
}

/// A book metadata document held in the content store.
///
/// Unknown fields are ignored and numeric fields accept numbers or numeric
/// strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDocument {
    /// Book title.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub title: Option<String>,
    /// Book author.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub author: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub description: Option<String>,
    /// ISBN.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub isbn: Option<String>,
    /// Genre.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub genre: Option<String>,
    /// Total copies, as published alongside the metadata.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::count")]
    pub quantity: Option<u64>,
    /// Copies on the shelf, as published alongside the metadata.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::count")]
    pub available_copies: Option<u64>,
    /// Cover image URI.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub cover_image: Option<String>,
}

impl BookDocument {
    /// Builds the document published for a draft, pointing at `cover_image`.
    #[must_use]
    pub fn from_draft(draft: &BookDraft, cover_image: String) -> Self {
        Self {
            title: Some(draft.title.clone()),
            author: Some(draft.author.clone()),
            description: Some(draft.description.clone()),
            isbn: Some(draft.isbn.clone()),
            genre: Some(draft.genre.clone()),
            quantity: Some(draft.quantity),
            available_copies: None,
            cover_image: Some(cover_image),
        }
    }
}

/// Where a draft's cover image comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverSource {
    /// An already published image.
    Uri(String),
    /// Image bytes to publish before the metadata document.
    Upload {
        /// File name recorded by the content store.
        file_name: String,
        /// Raw image bytes.
        bytes: Vec<u8>,
    },
}

/// Input for adding or updating a book.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct BookDraft {
    /// Book title.
    #[builder(into)]
    pub title: String,
    /// Book author.
    #[builder(into)]
    pub author: String,
    /// Free-form description.
    #[builder(into, default)]
    pub description: String,
    /// ISBN.
    #[builder(into, default)]
    pub isbn: String,
    /// Genre.
    #[builder(into, default)]
    pub genre: String,
    /// Total copies.
    pub quantity: u64,
    /// Cover image.
    pub cover: CoverSource,
}

/// A canonical, reconciled book.
///
/// Invariants: `id`, `title` and `cover_image` are non-empty and
/// `available_copies <= quantity`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover_image: String,
    pub isbn: String,
    pub genre: String,
    pub quantity: u64,
    pub available_copies: u64,
    pub metadata_uri: String,
    pub borrowers: Vec<Borrower>,
    /// Set when the content fetch failed but the record was still usable.
    pub metadata_error: bool,
}

impl Book {
    /// Copies currently on loan.
    #[must_use]
    pub fn borrowed_copies(&self) -> u64 {
        self.quantity.saturating_sub(self.available_copies)
    }

    /// Returns `true` if `address` holds a copy.
    #[must_use]
    pub fn is_borrowed_by(&self, address: &Address) -> bool {
        self.borrowers.iter().any(|b| &b.address == address)
    }
}

/// A borrow log entry joined with the book title.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowHistory {
    pub book_id: BookId,
    /// Title at read time, or `"Unknown"` when the book no longer exists.
    pub book_title: String,
    pub borrower: Address,
    pub borrow_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub transaction_hash: Option<TxHash>,
}

/// Lenient field deserializers for records from untrusted sources.
///
/// Each one maps a malformed value to "absent" instead of failing.
pub(crate) mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, de::DeserializeOwned};
    use serde_json::Value;

    use super::BookId;

    fn value_to_count(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.trunc() as u64)
            }),
            Value::String(s) => {
                let s = s.trim();
                if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    return u64::from_str_radix(hex, 16).ok();
                }
                s.parse::<u64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f.trunc() as u64)
                })
            },
            _ => None,
        }
    }

    fn value_to_text(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_to_count))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.and_then(value_to_text))
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<BookId, D::Error> {
        Ok(BookId::from(text(d)?.unwrap_or_default()))
    }

    pub fn optional_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(count(d)?.and_then(|secs| i64::try_from(secs).ok()))
    }

    pub fn seconds<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(optional_seconds(d)?.unwrap_or_default())
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(optional_seconds(d)?
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default())
    }

    pub fn entries<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let Some(Value::Array(values)) = Option::<Value>::deserialize(d)? else {
            return Ok(Vec::new());
        };
        let total = values.len();
        let parsed: Vec<T> =
            values.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect();
        if parsed.len() < total {
            tracing::debug!(dropped = total - parsed.len(), "malformed entries dropped");
        }
        Ok(parsed)
    }
}
