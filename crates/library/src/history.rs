//! Borrow history composition and activity statistics.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::{Address, Book, BookId, BorrowHistory, LedgerLogEntry};

/// Title shown for entries whose book no longer exists.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Window used by [`activity_stats`] callers that have no preference.
#[must_use]
pub fn default_activity_window() -> TimeDelta {
    TimeDelta::days(7)
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Joins raw log entries with book titles.
///
/// Entries keep their ledger order. An entry whose book is missing from
/// `books` gets [`UNKNOWN_TITLE`].
#[must_use]
pub fn compose_history(raw: &[LedgerLogEntry], books: &[Book]) -> Vec<BorrowHistory> {
    let titles: HashMap<&BookId, &str> =
        books.iter().map(|b| (&b.id, b.title.as_str())).collect();

    raw.iter()
        .map(|entry| {
            let return_date = match entry.return_timestamp {
                Some(secs) => Some(from_unix(secs)),
                None if entry.returned => Some(from_unix(entry.timestamp)),
                None => None,
            };
            BorrowHistory {
                book_id: entry.book_id.clone(),
                book_title: titles.get(&entry.book_id).copied().unwrap_or(UNKNOWN_TITLE).to_owned(),
                borrower: entry.borrower.clone(),
                borrow_date: from_unix(entry.timestamp),
                return_date,
                transaction_hash: entry.tx_hash.clone(),
            }
        })
        .collect()
}

/// Keeps the entries borrowed by `borrower`.
#[must_use]
pub fn filter_by_borrower(
    raw: impl IntoIterator<Item = LedgerLogEntry>,
    borrower: &Address,
) -> Vec<LedgerLogEntry> {
    raw.into_iter().filter(|e| &e.borrower == borrower).collect()
}

/// Orders entries by borrow date, newest first. Ties keep their order.
pub fn sort_newest_first(history: &mut [BorrowHistory]) {
    history.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date));
}

/// Borrow counters of an [`ActivityStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorrowActivity {
    /// Every borrow on record.
    pub total: usize,
    /// Borrows not yet returned.
    pub active: usize,
    /// Borrows inside the window.
    pub recent: usize,
}

/// Return counters of an [`ActivityStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnActivity {
    /// Every return on record.
    pub total: usize,
    /// Returns inside the window.
    pub recent: usize,
}

/// Borrow and return counts over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityStats {
    pub borrows: BorrowActivity,
    pub returns: ReturnActivity,
    /// Start of the window (inclusive).
    pub since: DateTime<Utc>,
}

/// Counts activity in the window of length `window` ending at `now`.
///
/// A window reaching past the earliest representable time covers all
/// history.
#[must_use]
pub fn activity_stats(
    history: &[BorrowHistory],
    window: TimeDelta,
    now: DateTime<Utc>,
) -> ActivityStats {
    let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let in_window = |at: DateTime<Utc>| at >= since && at <= now;

    let mut borrows = BorrowActivity::default();
    let mut returns = ReturnActivity::default();
    for entry in history {
        borrows.total += 1;
        if in_window(entry.borrow_date) {
            borrows.recent += 1;
        }
        match entry.return_date {
            Some(returned_at) => {
                returns.total += 1;
                if in_window(returned_at) {
                    returns.recent += 1;
                }
            },
            None => borrows.active += 1,
        }
    }
    ActivityStats { borrows, returns, since }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TxHash;

    const DAY: i64 = 86_400;
    const NOW: i64 = 1_700_000_000;

    fn entry(book: &str, borrower: &str, timestamp: i64) -> LedgerLogEntry {
        LedgerLogEntry {
            book_id: BookId::from(book),
            borrower: Address::parse(borrower),
            timestamp,
            returned: false,
            return_timestamp: None,
            tx_hash: None,
        }
    }

    fn book(id: &str, title: &str) -> Book {
        Book {
            id: BookId::from(id),
            title: title.into(),
            author: "A".into(),
            description: String::new(),
            cover_image: "https://img".into(),
            isbn: String::new(),
            genre: String::new(),
            quantity: 1,
            available_copies: 1,
            metadata_uri: String::new(),
            borrowers: Vec::new(),
            metadata_error: false,
        }
    }

    #[test]
    fn test_compose_joins_titles_and_marks_deleted_books() {
        let raw = vec![entry("1", "0xa", NOW), entry("2", "0xb", NOW)];
        let history = compose_history(&raw, &[book("1", "Dune")]);

        assert_eq!(history[0].book_title, "Dune");
        assert_eq!(history[1].book_title, UNKNOWN_TITLE);
        assert_eq!(history[0].borrow_date.timestamp(), NOW);
        assert_eq!(history[0].transaction_hash, None);
    }

    #[test]
    fn test_return_date_derivation() {
        let open = entry("1", "0xa", NOW);
        let returned_without_time = LedgerLogEntry { returned: true, ..entry("1", "0xa", NOW) };
        let returned_with_time = LedgerLogEntry {
            returned: true,
            return_timestamp: Some(NOW + DAY),
            tx_hash: Some(TxHash::new("0xfeed")),
            ..entry("1", "0xa", NOW)
        };

        let history = compose_history(&[open, returned_without_time, returned_with_time], &[]);
        assert_eq!(history[0].return_date, None);
        assert_eq!(history[1].return_date.map(|d| d.timestamp()), Some(NOW));
        assert_eq!(history[2].return_date.map(|d| d.timestamp()), Some(NOW + DAY));
        assert_eq!(history[2].transaction_hash, Some(TxHash::new("0xfeed")));
    }

    #[test]
    fn test_filter_by_borrower_is_exact() {
        let raw = vec![entry("1", "0xA", NOW), entry("2", "0xab", NOW), entry("3", "0xa", NOW)];
        let filtered = filter_by_borrower(raw, &Address::parse("0xa"));
        let ids: Vec<_> = filtered.iter().map(|e| e.book_id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn test_sort_newest_first() {
        let raw = vec![
            entry("1", "0xa", NOW - DAY),
            entry("2", "0xa", NOW),
            entry("3", "0xa", NOW - 2 * DAY),
        ];
        let mut history = compose_history(&raw, &[]);
        sort_newest_first(&mut history);
        let ids: Vec<_> = history.iter().map(|h| h.book_id.as_str()).collect();
        assert_eq!(ids, ["2", "1", "3"]);
    }

    #[test]
    fn test_activity_stats_window() {
        let raw = vec![
            entry("1", "0xa", NOW - DAY),
            LedgerLogEntry {
                returned: true,
                return_timestamp: Some(NOW - 2 * DAY),
                ..entry("2", "0xa", NOW - 10 * DAY)
            },
            LedgerLogEntry {
                returned: true,
                return_timestamp: Some(NOW - 9 * DAY),
                ..entry("3", "0xb", NOW - 20 * DAY)
            },
        ];
        let history = compose_history(&raw, &[]);
        let now = from_unix(NOW);
        let stats = activity_stats(&history, default_activity_window(), now);

        assert_eq!(stats.borrows, BorrowActivity { total: 3, active: 1, recent: 1 });
        assert_eq!(stats.returns, ReturnActivity { total: 2, recent: 1 });
        assert_eq!(stats.since, now - TimeDelta::days(7));
    }

    #[test]
    fn test_activity_stats_unbounded_window() {
        let raw = vec![entry("1", "0xa", 0), entry("2", "0xb", NOW)];
        let history = compose_history(&raw, &[]);

        let stats = activity_stats(&history, TimeDelta::MAX, from_unix(NOW));
        assert_eq!(stats.since, DateTime::<Utc>::MIN_UTC);
        assert_eq!(stats.borrows, BorrowActivity { total: 2, active: 2, recent: 2 });
    }
}
