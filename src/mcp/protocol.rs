//! JSON-RPC 2.0 envelope types shared by the stdio and HTTP transports.

use crate::error::{ErrorKind, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: Value, result: Result<Value, JsonRpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(id, error),
        }
    }
}

impl JsonRpcError {
    fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(json!({ "kind": ErrorKind::ProtocolError })),
        }
    }

    pub fn parse_error(err: impl std::fmt::Display) -> Self {
        Self::protocol(PARSE_ERROR, format!("Parse error: {}", err))
    }

    pub fn invalid_request(reason: impl std::fmt::Display) -> Self {
        Self::protocol(INVALID_REQUEST, format!("Invalid request: {}", reason))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::protocol(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(reason: impl std::fmt::Display) -> Self {
        Self::protocol(INVALID_PARAMS, format!("Invalid params: {}", reason))
    }

    pub fn unknown_tool(err: &ToolError) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: err.to_string(),
            data: Some(json!({ "kind": err.kind(), "message": err.to_string() })),
        }
    }
}

/// Decodes one message, producing the error response to send when it is unusable.
pub fn parse_request(input: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(input)
        .map_err(|e| JsonRpcResponse::failure(Value::Null, JsonRpcError::parse_error(e)))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let req: JsonRpcRequest = serde_json::from_value(value)
        .map_err(|e| JsonRpcResponse::failure(id.clone(), JsonRpcError::invalid_request(e)))?;

    if req.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::failure(
            id,
            JsonRpcError::invalid_request(format!("unsupported jsonrpc version '{}'", req.jsonrpc)),
        ));
    }
    Ok(req)
}
