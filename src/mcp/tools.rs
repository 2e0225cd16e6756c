//! Purpose: Expose the document operations as MCP tools over one open `Store`.
//! Exports: `DocstoreMcpHandler`.
//! Role: Argument decoding + tool catalog; all behavior lives in the engine.
//! Invariants: Missing or ill-typed arguments are JSON-RPC `invalid_params` errors.
//! Invariants: Engine failures become `isError` tool results carrying kind and retryability.
//! Invariants: Tool names and result envelopes match the CLI JSON output.

use std::path::PathBuf;

use serde_json::{Map, Number, Value, json};

use super::{JsonRpcError, McpTool, ToolCallRequest, ToolCallResult, ToolHandler};
use crate::api::{
    Document, Error, Store, bulk_insert, bulk_insert_json, count, count_json, create_record,
    created_json, get_row, get_row_json, increment_field, key_page_json, list_keys, next_pending,
    next_pending_json, range_json, record_page_json, scan_range, search, set_columns, set_value,
    updated_json,
};

pub struct DocstoreMcpHandler {
    store: Store,
}

impl DocstoreMcpHandler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn run(&self, name: &str, args: &Map<String, Value>) -> Result<Result<Value, Error>, JsonRpcError> {
        let store = &self.store;
        let outcome = match name {
            "search" => {
                let field = required_str(args, "field")?;
                let value = required_value(args, "value")?;
                let page = optional_page(args)?;
                search(store, field, value, page).map(|page| record_page_json(&page))
            }
            "get_row" => {
                let key = required_str(args, "key")?;
                get_row(store, key).map(|value| get_row_json(key, value.as_ref()))
            }
            "list_keys" => {
                let page = optional_page(args)?;
                list_keys(store, page).map(|page| key_page_json(&page))
            }
            "count" => {
                let prefix = optional_str(args, "prefix")?.unwrap_or("");
                let column = required_str(args, "column")?;
                let value = required_value(args, "value")?;
                count(store, prefix, column, value).map(count_json)
            }
            "set_value" => {
                let key = required_str(args, "key")?;
                let column = required_str(args, "column")?;
                let value = required_value(args, "value")?.clone();
                set_value(store, key, column, value).map(|()| updated_json(key, None))
            }
            "create_record" => {
                let key = required_str(args, "key")?;
                let value = required_object(args, "value")?;
                create_record(store, key, value).map(|()| created_json(key))
            }
            "set_columns" => {
                let key = required_str(args, "key")?;
                let updates = required_object(args, "updates")?.clone();
                set_columns(store, key, updates).map(|()| updated_json(key, None))
            }
            "next_pending" => {
                let column = required_str(args, "column")?;
                let after_key = optional_str(args, "after_key")?;
                next_pending(store, column, after_key).map(|record| next_pending_json(record.as_ref()))
            }
            "increment_field" => {
                let key = required_str(args, "key")?;
                let column = required_str(args, "column")?;
                let amount = optional_number(args, "amount")?.unwrap_or_else(|| Number::from(1));
                increment_field(store, key, column, &amount)
                    .map(|value| updated_json(key, Some(Value::Number(value))))
            }
            "bulk_insert" => {
                let records = required_object(args, "records")?;
                let records = records
                    .iter()
                    .map(|(key, value)| match value {
                        Value::Object(document) => Ok((key.clone(), document.clone())),
                        _ => Err(JsonRpcError::invalid_params(format!(
                            "records[`{key}`] must be a JSON object"
                        ))),
                    })
                    .collect::<Result<Vec<(String, Document)>, _>>()?;
                bulk_insert(store, records).map(|outcome| bulk_insert_json(&outcome))
            }
            "scan_range" => {
                let start = required_str(args, "start")?;
                let end = required_str(args, "end")?;
                let include_values = optional_bool(args, "include_values")?.unwrap_or(false);
                scan_range(store, start, end, include_values)
                    .map(|entries| range_json(&entries, include_values))
            }
            "backup_database" => {
                let dest = PathBuf::from(required_str(args, "backup_path")?);
                store
                    .backup(&dest)
                    .map(|path| json!({ "backup_path": path.display().to_string() }))
            }
            _ => {
                return Err(JsonRpcError::invalid_params(format!("unknown tool: {name}")));
            }
        };
        Ok(outcome)
    }
}

impl ToolHandler for DocstoreMcpHandler {
    fn list_tools(&mut self) -> Vec<McpTool> {
        tool_catalog()
    }

    fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, JsonRpcError> {
        match self.run(&request.name, &request.arguments)? {
            Ok(payload) => Ok(ToolCallResult::structured(payload)),
            Err(err) => {
                tracing::debug!(tool = %request.name, error = %err, "tool failed");
                Ok(tool_error(&err))
            }
        }
    }
}

fn tool_error(err: &Error) -> ToolCallResult {
    let mut body = Map::new();
    body.insert("kind".to_string(), json!(err.kind().as_str()));
    body.insert("message".to_string(), json!(err.message().unwrap_or("error")));
    if let Some(key) = err.key() {
        body.insert("key".to_string(), json!(key));
    }
    if let Some(hint) = err.hint() {
        body.insert("hint".to_string(), json!(hint));
    }
    body.insert("retryable".to_string(), json!(err.is_retryable()));
    ToolCallResult::execution_error(err.to_string(), Some(json!({ "error": body })))
}

fn required_value<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a Value, JsonRpcError> {
    args.get(name)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("missing required argument `{name}`")))
}

fn required_str<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str, JsonRpcError> {
    required_value(args, name)?
        .as_str()
        .ok_or_else(|| JsonRpcError::invalid_params(format!("argument `{name}` must be a string")))
}

fn required_object<'a>(
    args: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a Document, JsonRpcError> {
    required_value(args, name)?
        .as_object()
        .ok_or_else(|| JsonRpcError::invalid_params(format!("argument `{name}` must be an object")))
}

fn optional_str<'a>(
    args: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, JsonRpcError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(JsonRpcError::invalid_params(format!(
            "argument `{name}` must be a string or null"
        ))),
    }
}

fn optional_bool(args: &Map<String, Value>, name: &str) -> Result<Option<bool>, JsonRpcError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(JsonRpcError::invalid_params(format!(
            "argument `{name}` must be a boolean"
        ))),
    }
}

fn optional_number(args: &Map<String, Value>, name: &str) -> Result<Option<Number>, JsonRpcError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => Ok(Some(value.clone())),
        Some(_) => Err(JsonRpcError::invalid_params(format!(
            "argument `{name}` must be a number"
        ))),
    }
}

fn optional_page(args: &Map<String, Value>) -> Result<u64, JsonRpcError> {
    match args.get("page") {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            JsonRpcError::invalid_params("argument `page` must be a non-negative integer")
        }),
    }
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> McpTool {
    McpTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        }),
    }
}

fn tool_catalog() -> Vec<McpTool> {
    let page = json!({"type": "integer", "minimum": 0, "default": 0, "description": "Zero-based page index"});
    let any_value = json!({"description": "Value to compare (string, number, boolean, or null)"});
    vec![
        tool(
            "search",
            "Find records whose top-level JSON field equals a value, 10 per page in key order",
            json!({"field": {"type": "string"}, "value": any_value, "page": page}),
            &["field", "value"],
        ),
        tool(
            "get_row",
            "Fetch the JSON document stored under an exact key",
            json!({"key": {"type": "string"}}),
            &["key"],
        ),
        tool(
            "list_keys",
            "List keys in ascending order, 200 per page",
            json!({"page": page}),
            &[],
        ),
        tool(
            "count",
            "Count records under a key prefix whose column equals a value",
            json!({"prefix": {"type": "string", "default": ""}, "column": {"type": "string"}, "value": any_value}),
            &["column", "value"],
        ),
        tool(
            "set_value",
            "Set one column of an existing record",
            json!({"key": {"type": "string"}, "column": {"type": "string"}, "value": {}}),
            &["key", "column", "value"],
        ),
        tool(
            "create_record",
            "Create a new record; fails if the key already exists",
            json!({"key": {"type": "string"}, "value": {"type": "object"}}),
            &["key", "value"],
        ),
        tool(
            "set_columns",
            "Update several columns of an existing record at once",
            json!({"key": {"type": "string"}, "updates": {"type": "object"}}),
            &["key", "updates"],
        ),
        tool(
            "next_pending",
            "Return the first record after `after_key` whose column equals 1",
            json!({"column": {"type": "string"}, "after_key": {"type": ["string", "null"]}}),
            &["column"],
        ),
        tool(
            "increment_field",
            "Add an amount (default 1) to a numeric column; a missing column starts at 0",
            json!({"key": {"type": "string"}, "column": {"type": "string"}, "amount": {"type": "number", "default": 1}}),
            &["key", "column"],
        ),
        tool(
            "bulk_insert",
            "Create many records; keys that already exist are skipped",
            json!({"records": {"type": "object", "additionalProperties": {"type": "object"}}}),
            &["records"],
        ),
        tool(
            "scan_range",
            "List keys in the inclusive range [start, end], optionally with values",
            json!({"start": {"type": "string"}, "end": {"type": "string"}, "include_values": {"type": "boolean", "default": false}}),
            &["start", "end"],
        ),
        tool(
            "backup_database",
            "Write a compacted copy of the database into a directory",
            json!({"backup_path": {"type": "string"}}),
            &["backup_path"],
        ),
    ]
}
