//! Purpose: Shared JSON result envelopes for CLI output and MCP tool results.
//! Exports: One `*_json` builder per operation.
//! Role: Keep result shapes identical across the CLI, stdio MCP, and HTTP MCP paths.
//! Invariants: Stable key names; additive-only.
//! Invariants: Absent records render as `null` values, never as errors.

use serde_json::{Map, Value, json};

use crate::core::codec::Document;
use crate::core::mutate::BulkInsertOutcome;
use crate::core::page::Page;
use crate::core::scan::{RangeEntry, Record};
use crate::core::store::StoreStats;

fn record_json(record: &Record) -> Value {
    json!({
        "key": record.key,
        "value": Value::Object(record.value.clone()),
    })
}

pub fn record_page_json(page: &Page<Record>) -> Value {
    let results = page.items.iter().map(record_json).collect::<Vec<_>>();
    json!({
        "results": results,
        "page": page.page,
        "next_page": page.next_page,
    })
}

pub fn key_page_json(page: &Page<String>) -> Value {
    json!({
        "keys": page.items,
        "page": page.page,
        "next_page": page.next_page,
    })
}

pub fn get_row_json(key: &str, value: Option<&Document>) -> Value {
    json!({
        "key": key,
        "value": value.map(|document| Value::Object(document.clone())),
    })
}

pub fn count_json(count: u64) -> Value {
    json!({ "count": count })
}

pub fn created_json(key: &str) -> Value {
    json!({ "created": true, "key": key })
}

pub fn updated_json(key: &str, value: Option<Value>) -> Value {
    let mut map = Map::new();
    map.insert("updated".to_string(), Value::Bool(true));
    map.insert("key".to_string(), json!(key));
    if let Some(value) = value {
        map.insert("value".to_string(), value);
    }
    Value::Object(map)
}

pub fn next_pending_json(record: Option<&Record>) -> Value {
    match record {
        Some(record) => record_json(record),
        None => json!({ "key": Value::Null, "value": Value::Null }),
    }
}

pub fn bulk_insert_json(outcome: &BulkInsertOutcome) -> Value {
    json!({
        "inserted": outcome.inserted,
        "skipped": outcome.skipped,
    })
}

/// Keys only render as a list of strings; with values, as `{key, value}` objects.
pub fn range_json(entries: &[RangeEntry], include_values: bool) -> Value {
    let results = entries
        .iter()
        .map(|entry| match (&entry.value, include_values) {
            (Some(document), true) => json!({
                "key": entry.key,
                "value": Value::Object(document.clone()),
            }),
            _ => json!(entry.key),
        })
        .collect::<Vec<_>>();
    json!({ "results": results })
}

pub fn stats_json(stats: &StoreStats) -> Value {
    json!({
        "path": stats.path.display().to_string(),
        "entries": stats.entries,
        "map_size": stats.map_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_pending_record_renders_nulls() {
        assert_eq!(
            next_pending_json(None),
            json!({"key": null, "value": null})
        );
    }

    #[test]
    fn record_page_carries_cursor_fields() {
        let page = Page {
            items: vec![Record {
                key: "task:1".to_string(),
                value: json!({"status": 1}).as_object().expect("object").clone(),
            }],
            page: 0,
            next_page: Some(1),
        };
        let value = record_page_json(&page);
        assert_eq!(value["results"][0]["key"], json!("task:1"));
        assert_eq!(value["results"][0]["value"]["status"], json!(1));
        assert_eq!(value["next_page"], json!(1));
    }

    #[test]
    fn range_renders_keys_or_records() {
        let entries = vec![RangeEntry {
            key: "a".to_string(),
            value: Some(json!({"id": 1}).as_object().expect("object").clone()),
        }];
        assert_eq!(range_json(&entries, false), json!({"results": ["a"]}));
        assert_eq!(
            range_json(&entries, true),
            json!({"results": [{"key": "a", "value": {"id": 1}}]})
        );
    }

    #[test]
    fn update_envelope_includes_value_when_present() {
        assert_eq!(
            updated_json("k", None),
            json!({"updated": true, "key": "k"})
        );
        assert_eq!(
            updated_json("k", Some(json!(3)))["value"],
            json!(3)
        );
    }
}
