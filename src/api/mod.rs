//! Purpose: Define the stable public Rust API boundary for docstore.
//! Exports: The store handle, document operations, and their result types.
//! Role: Single import path for the CLI, MCP tools, and embedding applications.
//! Invariants: Additive-only surface; engine modules stay reachable but are not the contract.

mod record;

pub use crate::core::codec::{Document, decode, encode};
pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::mutate::{
    BulkInsertOutcome, bulk_insert, create_record, increment_field, set_columns, set_value,
};
pub use crate::core::page::{KEY_PAGE_SIZE, Page, SEARCH_PAGE_SIZE};
pub use crate::core::predicate::{matches, values_equal};
pub use crate::core::scan::{
    PENDING_VALUE, RangeEntry, Record, count, get_row, list_keys, next_pending, scan_range, search,
};
pub use crate::core::store::{
    DEFAULT_MAP_SIZE, DEFAULT_MAX_READERS, MAX_KEY_BYTES, Store, StoreOptions, StoreStats,
};
pub use record::{
    bulk_insert_json, count_json, created_json, get_row_json, key_page_json, next_pending_json,
    range_json, record_page_json, stats_json, updated_json,
};
