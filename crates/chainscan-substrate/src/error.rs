//! Error types for the Substrate connection.

use thiserror::Error;

use chainscan_core::ScanError;

use crate::rpc::JsonRpcError;

/// Errors raised while talking to a Substrate node or decoding its data.
#[derive(Debug, Error)]
pub enum SubstrateError {
    /// WebSocket connect/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The connection was closed, locally or by the node.
    #[error("connection closed")]
    Closed,

    /// Connect or request timed out.
    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Runtime metadata is malformed or of an unsupported version.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// A SCALE-encoded value did not match its declared type.
    #[error("SCALE decode error: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl SubstrateError {
    /// Map into the scan taxonomy as a per-query failure.
    pub fn into_query(self) -> ScanError {
        ScanError::query(self)
    }

    /// Map into the scan taxonomy as a connection failure.
    pub fn into_connection(self, endpoint: &str) -> ScanError {
        ScanError::connection(endpoint, self)
    }
}

impl From<SubstrateError> for ScanError {
    fn from(err: SubstrateError) -> Self {
        err.into_query()
    }
}
