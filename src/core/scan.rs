//! Purpose: Ordered, read-only scans over the store: search, listing, counting, pending scan.
//! Exports: `search`, `get_row`, `list_keys`, `count`, `next_pending`, `scan_range`, `Record`.
//! Role: Backbone of every query; one read transaction per call, released on drop.
//! Invariants: Iteration follows ascending byte order of keys; pagination is positional.
//! Invariants: Undecodable values are logged and treated as non-matching during scans.
//! Invariants: Every key handed out is UTF-8 and addresses the record it came from.
//! Invariants: `get_row` surfaces decode failures instead of skipping them.

use std::ops::Bound;

use serde_json::Value;

use crate::core::codec::{Document, decode};
use crate::core::error::Error;
use crate::core::page::{KEY_PAGE_SIZE, Page, PageWindow, SEARCH_PAGE_SIZE};
use crate::core::predicate::matches;
use crate::core::store::{Store, display_key, scanned_key, storage_error, validate_key};

/// Column value that marks a record as pending work.
pub const PENDING_VALUE: i64 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Document,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RangeEntry {
    pub key: String,
    pub value: Option<Document>,
}

/// Decode a scanned value, or log and drop it so one bad record cannot abort a scan.
fn decode_scanned(key: &[u8], raw: &[u8]) -> Option<Document> {
    match decode(raw) {
        Ok(document) => Some(document),
        Err(err) => {
            tracing::warn!(key = %display_key(key), error = %err, "skipping undecodable record");
            None
        }
    }
}

pub fn search(store: &Store, field: &str, value: &Value, page: u64) -> Result<Page<Record>, Error> {
    tracing::debug!(field, page, "search");
    let rtxn = store.read_txn()?;
    let iter = store
        .database()
        .iter(&rtxn)
        .map_err(|err| storage_error(err, "failed to open cursor"))?;

    let mut window = PageWindow::new(page, SEARCH_PAGE_SIZE);
    for entry in iter {
        let (raw_key, raw) = entry.map_err(|err| storage_error(err, "failed to read entry"))?;
        let Some(key) = scanned_key(raw_key) else {
            continue;
        };
        let Some(document) = decode_scanned(raw_key, raw) else {
            continue;
        };
        if !matches(&document, field, value) {
            continue;
        }
        let record = Record {
            key,
            value: document,
        };
        if !window.offer(record) {
            break;
        }
    }
    Ok(window.finish())
}

pub fn get_row(store: &Store, key: &str) -> Result<Option<Document>, Error> {
    validate_key(key)?;
    let rtxn = store.read_txn()?;
    let raw = store
        .database()
        .get(&rtxn, key.as_bytes())
        .map_err(|err| storage_error(err, "failed to read record").with_key(key))?;
    match raw {
        Some(raw) => decode(raw).map(Some).map_err(|err| err.with_key(key)),
        None => Ok(None),
    }
}

pub fn list_keys(store: &Store, page: u64) -> Result<Page<String>, Error> {
    tracing::debug!(page, "list keys");
    let rtxn = store.read_txn()?;
    let iter = store
        .database()
        .iter(&rtxn)
        .map_err(|err| storage_error(err, "failed to open cursor"))?;

    let mut window = PageWindow::new(page, KEY_PAGE_SIZE);
    for entry in iter {
        let (raw_key, _) = entry.map_err(|err| storage_error(err, "failed to read entry"))?;
        let Some(key) = scanned_key(raw_key) else {
            continue;
        };
        if !window.offer(key) {
            break;
        }
    }
    Ok(window.finish())
}

/// Count records whose key starts with `prefix` and whose `column` equals `value`.
pub fn count(store: &Store, prefix: &str, column: &str, value: &Value) -> Result<u64, Error> {
    tracing::debug!(prefix, column, "count");
    let rtxn = store.read_txn()?;
    let db = store.database();
    // LMDB rejects zero-length cursor keys, so an empty prefix walks the whole store.
    if prefix.is_empty() {
        let iter = db
            .iter(&rtxn)
            .map_err(|err| storage_error(err, "failed to open cursor"))?;
        return count_matches(iter, column, value);
    }
    let iter = db
        .prefix_iter(&rtxn, prefix.as_bytes())
        .map_err(|err| storage_error(err, "failed to open prefix cursor"))?;
    count_matches(iter, column, value)
}

fn count_matches<'txn>(
    entries: impl Iterator<Item = heed::Result<(&'txn [u8], &'txn [u8])>>,
    column: &str,
    value: &Value,
) -> Result<u64, Error> {
    let mut total = 0u64;
    for entry in entries {
        let (key, raw) = entry.map_err(|err| storage_error(err, "failed to read entry"))?;
        if decode_scanned(key, raw).is_some_and(|document| matches(&document, column, value)) {
            total += 1;
        }
    }
    Ok(total)
}

/// First record after `after_key` (exclusive) whose `column` equals 1.
///
/// Built for sequential draining: pass the key just returned to get the next
/// one. The scan never wraps back to keys at or before `after_key`.
pub fn next_pending(
    store: &Store,
    column: &str,
    after_key: Option<&str>,
) -> Result<Option<Record>, Error> {
    tracing::debug!(column, after_key, "next pending");
    let pending = Value::from(PENDING_VALUE);
    let lower = match after_key {
        Some(after) if !after.is_empty() => Bound::Excluded(after.as_bytes()),
        _ => Bound::Unbounded,
    };
    let range = (lower, Bound::<&[u8]>::Unbounded);

    let rtxn = store.read_txn()?;
    let iter = store
        .database()
        .range(&rtxn, &range)
        .map_err(|err| storage_error(err, "failed to open range cursor"))?;

    for entry in iter {
        let (raw_key, raw) = entry.map_err(|err| storage_error(err, "failed to read entry"))?;
        let Some(key) = scanned_key(raw_key) else {
            continue;
        };
        let Some(document) = decode_scanned(raw_key, raw) else {
            continue;
        };
        if matches(&document, column, &pending) {
            return Ok(Some(Record {
                key,
                value: document,
            }));
        }
    }
    Ok(None)
}

/// Keys in the inclusive range `[start, end]`, optionally with their documents.
pub fn scan_range(
    store: &Store,
    start: &str,
    end: &str,
    include_values: bool,
) -> Result<Vec<RangeEntry>, Error> {
    tracing::debug!(start, end, include_values, "scan range");
    if start.as_bytes() > end.as_bytes() {
        return Ok(Vec::new());
    }
    let lower = if start.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Included(start.as_bytes())
    };
    if end.is_empty() {
        return Ok(Vec::new());
    }
    let range = (lower, Bound::Included(end.as_bytes()));

    let rtxn = store.read_txn()?;
    let iter = store
        .database()
        .range(&rtxn, &range)
        .map_err(|err| storage_error(err, "failed to open range cursor"))?;

    let mut entries = Vec::new();
    for entry in iter {
        let (raw_key, raw) = entry.map_err(|err| storage_error(err, "failed to read entry"))?;
        let Some(key) = scanned_key(raw_key) else {
            continue;
        };
        if !include_values {
            entries.push(RangeEntry { key, value: None });
            continue;
        }
        if let Some(document) = decode_scanned(raw_key, raw) {
            entries.push(RangeEntry {
                key,
                value: Some(document),
            });
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::store::StoreOptions;
    use serde_json::json;

    fn seeded(entries: &[(&str, &[u8])]) -> (tempfile::TempDir, Store) {
        let raw: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(key, value)| (key.as_bytes(), *value))
            .collect();
        seeded_raw(&raw)
    }

    fn seeded_raw(entries: &[(&[u8], &[u8])]) -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = Store::open(temp.path().join("db"), StoreOptions::new()).expect("open");
        {
            let mut wtxn = store.write_txn().expect("wtxn");
            for (key, raw) in entries {
                store.database().put(&mut wtxn, key, raw).expect("put");
            }
            wtxn.commit().expect("commit");
        }
        (temp, store)
    }

    fn tasks() -> (tempfile::TempDir, Store) {
        seeded(&[
            ("task:1", br#"{"id":1,"status":1}"#),
            ("task:2", br#"{"id":2,"status":1}"#),
            ("task:3", br#"{"id":3,"status":0}"#),
            ("task:4", br#"{"id":4,"status":1}"#),
            ("task:5", br#"{"id":5,"status":2}"#),
        ])
    }

    fn keys_of(records: &[Record]) -> Vec<&str> {
        records.iter().map(|record| record.key.as_str()).collect()
    }

    #[test]
    fn search_returns_matches_in_key_order() {
        let (_temp, store) = tasks();
        let page = search(&store, "status", &json!(1), 0).expect("search");
        assert_eq!(keys_of(&page.items), vec!["task:1", "task:2", "task:4"]);
        assert_eq!(page.next_page, None);
    }

    #[test]
    fn search_unknown_field_or_value_is_empty() {
        let (_temp, store) = tasks();
        assert!(search(&store, "status", &json!(9), 0).expect("search").items.is_empty());
        assert!(search(&store, "unknown", &json!(1), 0).expect("search").items.is_empty());
    }

    #[test]
    fn search_skips_corrupt_records() {
        let (_temp, store) = seeded(&[
            ("a", br#"{"status":1}"#),
            ("b", b"not-json"),
            ("c", b"[1,2,3]"),
            ("d", br#"{"status":1}"#),
        ]);
        let page = search(&store, "status", &json!(1), 0).expect("search");
        assert_eq!(keys_of(&page.items), vec!["a", "d"]);
    }

    #[test]
    fn get_row_surfaces_corrupt_value() {
        let (_temp, store) = seeded(&[("bad", b"not-json")]);
        let err = get_row(&store, "bad").expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.key(), Some("bad"));
    }

    #[test]
    fn get_row_missing_is_none() {
        let (_temp, store) = tasks();
        assert_eq!(get_row(&store, "missing").expect("get"), None);
        assert_eq!(
            get_row(&store, "task:2").expect("get").expect("row")["id"],
            json!(2)
        );
    }

    #[test]
    fn get_row_empty_key_is_usage_error() {
        let (_temp, store) = tasks();
        assert_eq!(get_row(&store, "").unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn list_keys_pages_by_two_hundred() {
        let keys: Vec<String> = (0..205).map(|i| format!("task:{i:03}")).collect();
        let entries: Vec<(&str, &[u8])> = keys
            .iter()
            .map(|key| (key.as_str(), &br#"{"status":1}"#[..]))
            .collect();
        let (_temp, store) = seeded(&entries);

        let first = list_keys(&store, 0).expect("page 0");
        assert_eq!(first.items.len(), 200);
        assert_eq!(first.next_page, Some(1));
        let second = list_keys(&store, 1).expect("page 1");
        assert_eq!(second.items, keys[200..].to_vec());
        assert_eq!(second.next_page, None);
        assert!(list_keys(&store, 2).expect("page 2").items.is_empty());
    }

    #[test]
    fn count_respects_prefix_and_type() {
        let (_temp, store) = seeded(&[
            ("job:1", br#"{"status":1}"#),
            ("task:1", br#"{"status":1}"#),
            ("task:2", br#"{"status":"1"}"#),
            ("task:3", br#"{"status":0}"#),
            ("tasks", br#"{"status":1}"#),
            ("u", br#"{"status":1}"#),
        ]);
        assert_eq!(count(&store, "task:", "status", &json!(1)).expect("count"), 1);
        assert_eq!(count(&store, "task", "status", &json!(1)).expect("count"), 2);
        assert_eq!(count(&store, "task:", "status", &json!("1")).expect("count"), 1);
        assert_eq!(count(&store, "", "status", &json!(1)).expect("count"), 4);
        assert_eq!(count(&store, "foo:", "status", &json!(1)).expect("count"), 0);
        assert_eq!(count(&store, "task:", "missing", &json!(1)).expect("count"), 0);
    }

    #[test]
    fn next_pending_drains_in_order() {
        let (_temp, store) = seeded(&[
            ("a", br#"{"status":1}"#),
            ("b", br#"{"status":0}"#),
            ("c", br#"{"status":1}"#),
        ]);
        let first = next_pending(&store, "status", None).expect("scan").expect("a");
        assert_eq!(first.key, "a");
        let second = next_pending(&store, "status", Some(&first.key))
            .expect("scan")
            .expect("c");
        assert_eq!(second.key, "c");
        assert_eq!(next_pending(&store, "status", Some("c")).expect("scan"), None);
    }

    #[test]
    fn next_pending_after_absent_key_starts_at_successor() {
        let (_temp, store) = tasks();
        let record = next_pending(&store, "status", Some("task:0"))
            .expect("scan")
            .expect("record");
        assert_eq!(record.key, "task:1");
        let record = next_pending(&store, "status", Some("task:2"))
            .expect("scan")
            .expect("record");
        assert_eq!(record.key, "task:4");
        assert_eq!(next_pending(&store, "missing", None).expect("scan"), None);
    }

    #[test]
    fn scan_range_is_inclusive() {
        let (_temp, store) = tasks();
        let keys: Vec<String> = scan_range(&store, "task:2", "task:4", false)
            .expect("range")
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(keys, vec!["task:2", "task:3", "task:4"]);

        let with_values = scan_range(&store, "task:2", "task:3", true).expect("range");
        assert_eq!(with_values[1].value.as_ref().expect("value")["id"], json!(3));
        assert!(scan_range(&store, "task:5", "task:2", false).expect("range").is_empty());
    }

    #[test]
    fn count_skips_corrupt_records_under_prefix() {
        let (_temp, store) = seeded(&[
            ("task:1", br#"{"status":1}"#),
            ("task:2", b"not-json"),
            ("task:3", b"[1,2]"),
            ("task:4", br#"{"status":1}"#),
            ("tasx", b"not-json"),
        ]);
        assert_eq!(count(&store, "task:", "status", &json!(1)).expect("count"), 2);
        assert_eq!(count(&store, "", "status", &json!(1)).expect("count"), 2);
    }

    #[test]
    fn next_pending_steps_past_corrupt_records() {
        let (_temp, store) = seeded(&[
            ("a", br#"{"status":0}"#),
            ("b", b"not-json"),
            ("c", b"[1]"),
            ("d", br#"{"status":1}"#),
        ]);
        let record = next_pending(&store, "status", Some("a"))
            .expect("scan")
            .expect("d");
        assert_eq!(record.key, "d");
        assert_eq!(next_pending(&store, "status", Some("d")).expect("scan"), None);
    }

    #[test]
    fn list_keys_includes_keys_with_corrupt_values() {
        let (_temp, store) = seeded(&[
            ("a", br#"{"status":1}"#),
            ("b", b"not-json"),
            ("c", b"[1,2]"),
        ]);
        assert_eq!(list_keys(&store, 0).expect("keys").items, vec!["a", "b", "c"]);
        let keys: Vec<String> = scan_range(&store, "a", "c", false)
            .expect("range")
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(scan_range(&store, "a", "c", true).expect("range").len(), 1);
    }

    #[test]
    fn non_utf8_keys_are_never_handed_out() {
        let (_temp, store) = seeded_raw(&[
            (b"a\xff", br#"{"s":1}"#),
            (b"b", br#"{"s":1}"#),
        ]);

        let mut after: Option<String> = None;
        let mut seen = Vec::new();
        while let Some(record) = next_pending(&store, "s", after.as_deref()).expect("scan") {
            assert!(seen.len() < 4, "drain did not advance: {seen:?}");
            seen.push(record.key.clone());
            after = Some(record.key);
        }
        assert_eq!(seen, vec!["b"]);

        assert_eq!(keys_of(&search(&store, "s", &json!(1), 0).expect("search").items), vec!["b"]);
        assert_eq!(list_keys(&store, 0).expect("keys").items, vec!["b"]);
        let range: Vec<String> = scan_range(&store, "a", "c", true)
            .expect("range")
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(range, vec!["b"]);
        assert_eq!(count(&store, "", "s", &json!(1)).expect("count"), 2);
    }
}
