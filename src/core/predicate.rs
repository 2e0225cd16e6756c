//! Purpose: Decide whether a document's top-level column equals an expected value.
//! Exports: `matches`, `values_equal`.
//! Role: Single equality rule shared by search, count, and the pending scan.
//! Invariants: Missing columns and cross-type comparisons are "no match", never errors.
//! Invariants: Numbers compare by numeric value, so `1` equals `1.0` but not `"1"`.
//! Invariants: Arrays and objects never match; only scalars (and null) participate.

use serde_json::{Number, Value};

use crate::core::codec::Document;

pub fn matches(document: &Document, field: &str, expected: &Value) -> bool {
    document
        .get(field)
        .is_some_and(|actual| values_equal(actual, expected))
}

pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        _ => false,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    // Mixed signed/unsigned integers above i64::MAX never fit the other side.
    if (a.is_u64() && b.is_i64()) || (a.is_i64() && b.is_u64()) {
        return false;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
