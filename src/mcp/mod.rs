//! Purpose: Transport-agnostic MCP JSON-RPC core for the document tools.
//! Key exports: `McpDispatcher`, `ToolHandler`, JSON-RPC envelopes, `parse_jsonrpc_line`.
//! Role: Shared protocol adapter used by the stdio and HTTP transports.
//! Invariants: Method routing is deterministic; unknown methods are protocol errors.
//! Invariants: Requests without an `id` are notifications and never produce a response.
//! Invariants: Tool execution failures are successful responses with `result.isError`.

mod tools;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub use tools::DocstoreMcpHandler;

const JSON_RPC_VERSION: &str = "2.0";
const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
pub const PARSE_ERROR_CODE: i32 = -32700;
pub const INVALID_REQUEST_CODE: i32 = -32600;
pub const METHOD_NOT_FOUND_CODE: i32 = -32601;
pub const INVALID_PARAMS_CODE: i32 = -32602;
pub const INTERNAL_ERROR_CODE: i32 = -32603;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
    Null,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JsonRpcRequest {
    pub id: Option<JsonRpcId>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: JsonRpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR_CODE, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST_CODE, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND_CODE, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS_CODE, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR_CODE, message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    Response(JsonRpcResponse),
    NoResponse,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerMetadata {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
    pub instructions: String,
}

impl Default for ServerMetadata {
    fn default() -> Self {
        Self {
            name: "docstore".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            instructions: "Tools for querying and updating JSON documents in an LMDB key/value store"
                .to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<Value>,
    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolCallResult {
    /// Successful result carrying `payload` both as text and as structured content.
    pub fn structured(payload: Value) -> Self {
        Self {
            content: vec![text_content(payload.to_string())],
            is_error: false,
            structured_content: Some(payload),
        }
    }

    pub fn execution_error(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            content: vec![text_content(message.into())],
            is_error: true,
            structured_content: details,
        }
    }
}

fn text_content(text: String) -> Value {
    json!({ "type": "text", "text": text })
}

pub trait ToolHandler {
    fn list_tools(&mut self) -> Vec<McpTool>;
    fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, JsonRpcError>;
}

pub struct McpDispatcher<H> {
    metadata: ServerMetadata,
    handler: H,
}

impl<H: ToolHandler> McpDispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self {
            metadata: ServerMetadata::default(),
            handler,
        }
    }

    pub fn metadata(&self) -> &ServerMetadata {
        &self.metadata
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn dispatch_value(&mut self, value: Value) -> DispatchOutcome {
        match parse_jsonrpc_request(value) {
            Ok(request) => self.dispatch_request(request),
            Err(response) => DispatchOutcome::Response(response),
        }
    }

    pub fn dispatch_request(&mut self, request: JsonRpcRequest) -> DispatchOutcome {
        let JsonRpcRequest { id, method, params } = request;
        let routed = self.route(&method, params);
        let Some(id) = id else {
            if let Err(error) = routed {
                tracing::debug!(method = %method, code = error.code, "notification failed");
            }
            return DispatchOutcome::NoResponse;
        };
        let response = match routed {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        };
        DispatchOutcome::Response(response)
    }

    fn route(&mut self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => {
                ensure_object_or_absent(params.as_ref())?;
                Ok(self.initialize_result())
            }
            "ping" => {
                ensure_object_or_absent(params.as_ref())?;
                Ok(json!({}))
            }
            "tools/list" => {
                ensure_object_or_absent(params.as_ref())?;
                let tools = self.handler.list_tools();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let request = parse_tool_call_params(params)?;
                tracing::debug!(tool = %request.name, "tool call");
                let result = self.handler.call_tool(request)?;
                serde_json::to_value(result)
                    .map_err(|_| JsonRpcError::internal_error("failed to encode tool result"))
            }
            _ if method.starts_with("notifications/") => Ok(json!({})),
            _ => Err(JsonRpcError::method_not_found(format!(
                "method not found: {method}"
            ))),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": self.metadata.protocol_version,
            "capabilities": {
                "tools": { "listChanged": false },
            },
            "serverInfo": {
                "name": self.metadata.name,
                "version": self.metadata.version,
            },
            "instructions": self.metadata.instructions,
        })
    }
}

pub fn parse_jsonrpc_line(line: &str) -> Result<Value, JsonRpcError> {
    serde_json::from_str::<Value>(line).map_err(|_| JsonRpcError::parse_error("invalid JSON"))
}

fn parse_jsonrpc_request(value: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let Value::Object(mut object) = value else {
        return Err(JsonRpcResponse::failure(
            JsonRpcId::Null,
            JsonRpcError::invalid_request("request must be a JSON object"),
        ));
    };

    let id = match object.remove("id") {
        Some(raw_id) => Some(
            parse_jsonrpc_id(raw_id)
                .map_err(|error| JsonRpcResponse::failure(JsonRpcId::Null, error))?,
        ),
        None => None,
    };
    let reply_id = id.clone().unwrap_or(JsonRpcId::Null);

    match object.remove("jsonrpc") {
        Some(Value::String(version)) if version == JSON_RPC_VERSION => {}
        Some(_) => {
            return Err(JsonRpcResponse::failure(
                reply_id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }
        None => {
            return Err(JsonRpcResponse::failure(
                reply_id,
                JsonRpcError::invalid_request("missing jsonrpc field"),
            ));
        }
    }

    let Some(Value::String(method)) = object.remove("method") else {
        return Err(JsonRpcResponse::failure(
            reply_id,
            JsonRpcError::invalid_request("missing method field"),
        ));
    };

    Ok(JsonRpcRequest {
        id,
        method,
        params: object.remove("params"),
    })
}

fn parse_jsonrpc_id(value: Value) -> Result<JsonRpcId, JsonRpcError> {
    match value {
        Value::String(value) => Ok(JsonRpcId::String(value)),
        Value::Number(value) => value
            .as_i64()
            .map(JsonRpcId::Number)
            .ok_or_else(|| JsonRpcError::invalid_request("id must be an integer number")),
        Value::Null => Ok(JsonRpcId::Null),
        _ => Err(JsonRpcError::invalid_request(
            "id must be a string, integer number, or null",
        )),
    }
}

fn ensure_object_or_absent(params: Option<&Value>) -> Result<(), JsonRpcError> {
    match params {
        None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
        _ => Err(JsonRpcError::invalid_params(
            "params must be an object when provided",
        )),
    }
}

fn parse_tool_call_params(params: Option<Value>) -> Result<ToolCallRequest, JsonRpcError> {
    let Some(Value::Object(mut params)) = params else {
        return Err(JsonRpcError::invalid_params(
            "tools/call requires object params",
        ));
    };
    let Some(Value::String(name)) = params.remove("name") else {
        return Err(JsonRpcError::invalid_params(
            "tools/call requires string param `name`",
        ));
    };
    let arguments = match params.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(arguments)) => arguments,
        Some(_) => {
            return Err(JsonRpcError::invalid_params(
                "tools/call `arguments` must be an object",
            ));
        }
    };
    Ok(ToolCallRequest { name, arguments })
}

fn is_false(value: &bool) -> bool {
    !*value
}
