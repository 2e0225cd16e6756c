//! Purpose: Write paths for documents: create, single/multi-column update, increment, bulk insert.
//! Exports: `create_record`, `set_value`, `set_columns`, `increment_field`, `bulk_insert`.
//! Role: Each call is one exclusive write transaction; it commits on success and aborts on drop.
//! Invariants: `create_record` never overwrites; updates never create records.
//! Invariants: A failed precondition leaves the stored bytes untouched.
//! Invariants: No call spans more than one document per transaction.

use serde_json::{Number, Value};

use crate::core::codec::{Document, decode, encode, json_type_name};
use crate::core::error::{Error, ErrorKind};
use crate::core::store::{Store, storage_error, validate_key};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkInsertOutcome {
    pub inserted: usize,
    pub skipped: Vec<String>,
}

pub fn create_record(store: &Store, key: &str, value: &Document) -> Result<(), Error> {
    validate_key(key)?;
    let bytes = encode(value)?;
    let db = store.database();
    let mut wtxn = store.write_txn()?;
    let existing = db
        .get(&wtxn, key.as_bytes())
        .map_err(|err| storage_error(err, "failed to read record").with_key(key))?;
    if existing.is_some() {
        return Err(Error::new(ErrorKind::AlreadyExists)
            .with_message("record already exists")
            .with_key(key));
    }
    db.put(&mut wtxn, key.as_bytes(), &bytes)
        .map_err(|err| storage_error(err, "failed to write record").with_key(key))?;
    wtxn.commit()
        .map_err(|err| storage_error(err, "failed to commit record").with_key(key))?;
    tracing::debug!(key, "record created");
    Ok(())
}

pub fn set_value(store: &Store, key: &str, column: &str, value: Value) -> Result<(), Error> {
    update_document(store, key, |document| {
        document.insert(column.to_string(), value);
        Ok(())
    })
}

/// Apply every `column -> value` pair in one read/modify/write cycle.
pub fn set_columns(store: &Store, key: &str, updates: Document) -> Result<(), Error> {
    update_document(store, key, |document| {
        document.extend(updates);
        Ok(())
    })
}

/// Add `amount` to a numeric column, treating a missing column as 0. Returns the new value.
pub fn increment_field(
    store: &Store,
    key: &str,
    column: &str,
    amount: &Number,
) -> Result<Number, Error> {
    update_document(store, key, |document| {
        let current = match document.get(column) {
            None => Number::from(0),
            Some(Value::Number(current)) => current.clone(),
            Some(other) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "column `{column}` holds a {}, not a number",
                        json_type_name(other)
                    ))
                    .with_key(key));
            }
        };
        let next = add_numbers(&current, amount).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("incrementing `{column}` overflows"))
                .with_key(key)
        })?;
        document.insert(column.to_string(), Value::Number(next.clone()));
        Ok(next)
    })
}

/// Insert each record with `create_record` semantics, one transaction per record.
/// Existing keys are reported in `skipped`; any other failure stops the batch.
pub fn bulk_insert(
    store: &Store,
    records: impl IntoIterator<Item = (String, Document)>,
) -> Result<BulkInsertOutcome, Error> {
    let records: Vec<(String, Document)> = records.into_iter().collect();
    for (key, _) in &records {
        validate_key(key)?;
    }

    let mut outcome = BulkInsertOutcome::default();
    for (key, value) in &records {
        match create_record(store, key, value) {
            Ok(()) => outcome.inserted += 1,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => outcome.skipped.push(key.clone()),
            Err(err) => return Err(err),
        }
    }
    tracing::debug!(
        inserted = outcome.inserted,
        skipped = outcome.skipped.len(),
        "bulk insert finished"
    );
    Ok(outcome)
}

/// Decode the document at `key`, let `apply` modify it, and write it back.
/// The write transaction is dropped (aborted) on every error path.
fn update_document<T>(
    store: &Store,
    key: &str,
    apply: impl FnOnce(&mut Document) -> Result<T, Error>,
) -> Result<T, Error> {
    validate_key(key)?;
    let db = store.database();
    let mut wtxn = store.write_txn()?;
    let raw = db
        .get(&wtxn, key.as_bytes())
        .map_err(|err| storage_error(err, "failed to read record").with_key(key))?;
    let mut document = match raw {
        Some(raw) => decode(raw).map_err(|err| err.with_key(key))?,
        None => {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("record not found")
                .with_key(key));
        }
    };

    let result = apply(&mut document)?;
    let bytes = encode(&document)?;
    db.put(&mut wtxn, key.as_bytes(), &bytes)
        .map_err(|err| storage_error(err, "failed to write record").with_key(key))?;
    wtxn.commit()
        .map_err(|err| storage_error(err, "failed to commit record").with_key(key))?;
    tracing::debug!(key, "record updated");
    Ok(result)
}

fn add_numbers(current: &Number, amount: &Number) -> Option<Number> {
    if current.is_f64() || amount.is_f64() {
        return Number::from_f64(current.as_f64()? + amount.as_f64()?);
    }
    let sum = integer_of(current)?.checked_add(integer_of(amount)?)?;
    if let Ok(sum) = i64::try_from(sum) {
        return Some(Number::from(sum));
    }
    u64::try_from(sum).ok().map(Number::from)
}

fn integer_of(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scan::get_row;
    use crate::core::store::StoreOptions;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().expect("object").clone()
    }

    fn open_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = Store::open(temp.path().join("db"), StoreOptions::new()).expect("open");
        (temp, store)
    }

    fn put_raw(store: &Store, key: &str, raw: &[u8]) {
        let mut wtxn = store.write_txn().expect("wtxn");
        store
            .database()
            .put(&mut wtxn, key.as_bytes(), raw)
            .expect("put");
        wtxn.commit().expect("commit");
    }

    #[test]
    fn create_then_get_returns_value() {
        let (_temp, store) = open_store();
        let value = doc(json!({"id": 9, "status": 0}));
        create_record(&store, "task:9", &value).expect("create");
        assert_eq!(get_row(&store, "task:9").expect("get"), Some(value));
    }

    #[test]
    fn create_duplicate_keeps_original() {
        let (_temp, store) = open_store();
        create_record(&store, "k", &doc(json!({"v": 1}))).expect("create");
        let err = create_record(&store, "k", &doc(json!({"v": 2}))).expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            get_row(&store, "k").expect("get"),
            Some(doc(json!({"v": 1})))
        );
    }

    #[test]
    fn set_value_overwrites_and_adds_columns() {
        let (_temp, store) = open_store();
        create_record(&store, "task:1", &doc(json!({"status": 0}))).expect("create");
        set_value(&store, "task:1", "status", json!(1)).expect("set status");
        set_value(&store, "task:1", "extra", json!(5)).expect("set extra");
        assert_eq!(
            get_row(&store, "task:1").expect("get"),
            Some(doc(json!({"status": 1, "extra": 5})))
        );
    }

    #[test]
    fn set_value_missing_key_is_not_found_and_creates_nothing() {
        let (_temp, store) = open_store();
        let err = set_value(&store, "missing", "status", json!(1)).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(get_row(&store, "missing").expect("get"), None);
    }

    #[test]
    fn set_value_on_corrupt_row_is_corrupt() {
        let (_temp, store) = open_store();
        put_raw(&store, "bad", b"not-json");
        let err = set_value(&store, "bad", "status", json!(1)).expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn set_columns_applies_all_updates() {
        let (_temp, store) = open_store();
        create_record(&store, "task:3", &doc(json!({"id": 3, "status": 0}))).expect("create");
        set_columns(&store, "task:3", doc(json!({"status": 1, "extra": 5}))).expect("update");
        assert_eq!(
            get_row(&store, "task:3").expect("get"),
            Some(doc(json!({"id": 3, "status": 1, "extra": 5})))
        );
        let err = set_columns(&store, "missing", doc(json!({"status": 1}))).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn increment_existing_and_missing_columns() {
        let (_temp, store) = open_store();
        create_record(&store, "task:1", &doc(json!({"status": 1}))).expect("create");
        let next = increment_field(&store, "task:1", "status", &Number::from(1)).expect("inc");
        assert_eq!(next, Number::from(2));
        let counter = increment_field(&store, "task:1", "counter", &Number::from(3)).expect("inc");
        assert_eq!(counter, Number::from(3));
        assert_eq!(
            get_row(&store, "task:1").expect("get"),
            Some(doc(json!({"status": 2, "counter": 3})))
        );
    }

    #[test]
    fn increment_non_numeric_leaves_record_unchanged() {
        let (_temp, store) = open_store();
        create_record(&store, "task:1", &doc(json!({"status": "done"}))).expect("create");
        let err = increment_field(&store, "task:1", "status", &Number::from(1)).expect_err("text");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(
            get_row(&store, "task:1").expect("get"),
            Some(doc(json!({"status": "done"})))
        );
    }

    #[test]
    fn add_numbers_handles_mixed_and_overflow() {
        assert_eq!(
            add_numbers(&Number::from(2), &Number::from(-5)),
            Some(Number::from(-3))
        );
        assert_eq!(
            add_numbers(&Number::from(1), &Number::from_f64(0.5).expect("float")),
            Number::from_f64(1.5)
        );
        assert_eq!(
            add_numbers(&Number::from(i64::MAX), &Number::from(1)),
            Some(Number::from(i64::MAX as u64 + 1))
        );
        assert_eq!(add_numbers(&Number::from(u64::MAX), &Number::from(1)), None);
    }

    #[test]
    fn bulk_insert_skips_existing_keys() {
        let (_temp, store) = open_store();
        create_record(&store, "task:1", &doc(json!({"id": 1}))).expect("create");
        let outcome = bulk_insert(
            &store,
            vec![
                ("task:1".to_string(), doc(json!({"id": 100}))),
                ("task:11".to_string(), doc(json!({"id": 11}))),
            ],
        )
        .expect("bulk");
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, vec!["task:1".to_string()]);
        assert_eq!(
            get_row(&store, "task:1").expect("get"),
            Some(doc(json!({"id": 1})))
        );
    }

    #[test]
    fn bulk_insert_rejects_invalid_keys_before_writing() {
        let (_temp, store) = open_store();
        let err = bulk_insert(
            &store,
            vec![
                ("task:1".to_string(), doc(json!({"id": 1}))),
                (String::new(), doc(json!({"id": 2}))),
            ],
        )
        .expect_err("empty key");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(get_row(&store, "task:1").expect("get"), None);
    }
}
