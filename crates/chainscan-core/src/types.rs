//! Shared types for the scanning pipeline.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ScanError;

// ─── ScanRequest ──────────────────────────────────────────────────────────────

/// What the caller asks to scan. Immutable once a scan begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Node endpoint, e.g. `wss://rpc.polkadot.io`.
    pub endpoint: String,
    /// First block to scan (inclusive).
    pub start_block: u64,
    /// Last block to scan (inclusive). Clamped to the chain head at scan time.
    pub end_block: u64,
}

impl ScanRequest {
    pub fn new(endpoint: impl Into<String>, start_block: u64, end_block: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            start_block,
            end_block,
        }
    }

    /// Reject malformed requests before any connection is attempted.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.endpoint.trim().is_empty() {
            return Err(ScanError::invalid_request("endpoint must not be empty"));
        }
        if self.start_block > self.end_block {
            return Err(ScanError::invalid_request(format!(
                "end block {} is before start block {}",
                self.end_block, self.start_block
            )));
        }
        Ok(())
    }
}

// ─── Phase ────────────────────────────────────────────────────────────────────

/// The execution stage during which an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    ApplyExtrinsic,
    Finalization,
    Initialization,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApplyExtrinsic => write!(f, "ApplyExtrinsic"),
            Self::Finalization => write!(f, "Finalization"),
            Self::Initialization => write!(f, "Initialization"),
        }
    }
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// A block hash as returned by the node (`0x…`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(pub String);

impl BlockHash {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The part of a block header the scanner cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
}

// ─── Raw events ───────────────────────────────────────────────────────────────

/// Declared metadata for one event field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: Option<String>,
    pub type_name: Option<String>,
    #[serde(default)]
    pub docs: Vec<String>,
}

impl FieldMeta {
    pub fn named(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            type_name: Some(type_name.into()),
            docs: vec![],
        }
    }
}

/// One event as emitted by the chain at a specific block.
///
/// `values` and `fields` are positionally aligned by construction; the
/// decoder tolerates a mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    /// Pallet / module name, e.g. `"balances"`.
    pub section: String,
    /// Event variant name, e.g. `"Transfer"`.
    pub method: String,
    pub phase: Phase,
    /// Index of the extrinsic for [`Phase::ApplyExtrinsic`] events.
    pub extrinsic_index: Option<u32>,
    /// Untyped field values, in declaration order.
    pub values: Vec<serde_json::Value>,
    /// Declared field metadata, in declaration order.
    pub fields: Vec<FieldMeta>,
    /// Event documentation, one entry per line.
    pub docs: Vec<String>,
}

// ─── Decoded events ───────────────────────────────────────────────────────────

/// The value half of a labeled parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Present(serde_json::Value),
    /// The metadata declared a field the raw record has no value for.
    Absent,
}

impl ParamValue {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

/// A single labeled value. Serializes as a one-key object `{label: value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub label: String,
    pub value: ParamValue,
}

impl Param {
    pub fn new(label: impl Into<String>, value: ParamValue) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

impl Serialize for Param {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match &self.value {
            ParamValue::Present(v) => map.serialize_entry(&self.label, v)?,
            ParamValue::Absent => map.serialize_entry(&self.label, &serde_json::Value::Null)?,
        }
        map.end()
    }
}

/// The durable output unit of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedEvent {
    pub block: u64,
    /// Position within the originating block's event list.
    pub id: u32,
    /// `"{section}:{method}"`.
    pub name: String,
    #[serde(rename = "type")]
    pub phase: Phase,
    /// `params[0]` is always the `"Docs"` label.
    pub params: Vec<Param>,
}

impl DecodedEvent {
    /// Look up a parameter by label.
    pub fn param(&self, label: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.label == label).map(|p| &p.value)
    }
}

/// Events accumulated across the blocks processed so far, in block order.
pub type ScanResult = Vec<DecodedEvent>;

// ─── ScanProgress ─────────────────────────────────────────────────────────────

/// Completion percentage of a scan, in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct ScanProgress(f64);

impl ScanProgress {
    pub const ZERO: Self = Self(0.0);
    pub const COMPLETE: Self = Self(100.0);

    /// `100 * done / total`, clamped. A zero `total` counts as complete.
    pub fn of(done: u64, total: u64) -> Self {
        if total == 0 {
            return Self::COMPLETE;
        }
        Self::from_percent(100.0 * done as f64 / total as f64)
    }

    pub fn from_percent(percent: f64) -> Self {
        Self(percent.clamp(0.0, 100.0))
    }

    pub fn percent(&self) -> f64 {
        self.0
    }

    pub fn is_complete(&self) -> bool {
        self.0 >= 100.0
    }
}

impl std::fmt::Display for ScanProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}%", self.0)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
