//! chainscan-core: the block-range event-scanning pipeline.
//!
//! # Architecture
//!
//! ```text
//! ScanSession (one scan at a time, generation token)
//!     └── BlockScanner (sequential, clamped to chain head)
//!             ├── ChainConnection (per block: hash → header → event log)
//!             └── decoder (per event: metadata-labeled params)
//! ```
//!
//! The pipeline is chain-agnostic; `chainscan-substrate` provides the
//! concrete connection for Substrate nodes.

pub mod connection;
pub mod decoder;
pub mod error;
pub mod scanner;
pub mod session;
pub mod types;

pub use connection::{ChainConnection, ChainConnector, ChainHandle};
pub use decoder::{decode, FieldLabel};
pub use error::ScanError;
pub use scanner::{BlockScanner, ScanAborted, ScanRange, ScanSink};
pub use session::{ScanOutcome, ScanSession, ScanStream, ScanUpdate, SessionConfig, SessionState};
pub use types::{
    BlockHash, BlockHeader, DecodedEvent, FieldMeta, Param, ParamValue, Phase, RawEventRecord,
    ScanProgress, ScanRequest, ScanResult,
};
