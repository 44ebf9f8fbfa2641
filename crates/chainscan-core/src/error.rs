//! Error types for the block-range scanning pipeline.

use thiserror::Error;

/// Errors that can terminate a scan.
///
/// Every variant is terminal for the scan it occurs in. Nothing in the
/// pipeline retries automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The endpoint was unreachable or the protocol handshake failed.
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// A chain query failed. `block` is the block being processed, if any.
    #[error("{}", describe_query(.block, .reason))]
    Query { block: Option<u64>, reason: String },

    /// The scan request was rejected before any connection was opened.
    #[error("invalid scan request: {reason}")]
    InvalidRequest { reason: String },

    /// The scan was replaced by a newer one or cancelled by the caller.
    #[error("scan cancelled")]
    Cancelled,
}

impl ScanError {
    pub fn connection(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn query(reason: impl ToString) -> Self {
        Self::Query {
            block: None,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Attach the block number to a query error that does not carry one yet.
    pub fn at_block(self, number: u64) -> Self {
        match self {
            Self::Query { block: None, reason } => Self::Query {
                block: Some(number),
                reason,
            },
            other => other,
        }
    }

    /// Returns `true` for endpoint / handshake failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` for per-block query failures.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    /// Returns `true` if the request was rejected before connecting.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }
}

fn describe_query(block: &Option<u64>, reason: &str) -> String {
    match block {
        Some(n) => format!("query for block {n} failed: {reason}"),
        None => format!("query failed: {reason}"),
    }
}
