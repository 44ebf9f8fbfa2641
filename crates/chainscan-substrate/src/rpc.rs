//! JSON-RPC 2.0 wire types and the Substrate response shapes we read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SubstrateError;

/// A JSON-RPC 2.0 request. Substrate nodes only ever see numeric IDs from us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response. `id` is `None` for notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Unwrap the result value or return the node's error.
    ///
    /// A missing `result` is `null`: Substrate uses it for "not found".
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

// ─── Substrate response shapes ────────────────────────────────────────────────

/// `chain_getHeader` result (the fields we use).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderJson {
    pub number: String,
    pub parent_hash: String,
}

/// `chain_getBlock` result.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedBlockJson {
    pub block: BlockJson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockJson {
    pub header: HeaderJson,
}

/// `state_getRuntimeVersion` result (the fields we use).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersionJson {
    pub spec_name: String,
    pub spec_version: u32,
}

/// Parse a `0x`-prefixed hex quantity (block numbers in headers).
pub fn parse_hex_u64(s: &str) -> Result<u64, SubstrateError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| SubstrateError::Other(format!("invalid hex quantity {s:?}: {e}")))
}

/// Decode a `0x`-prefixed hex byte string (storage values, metadata).
pub fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, SubstrateError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(digits)?)
}
