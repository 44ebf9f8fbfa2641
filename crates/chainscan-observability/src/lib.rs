//! # chainscan-observability
//!
//! Structured logging for ChainScan.
//!
//! Log output is human-readable text by default and JSON (ELK / Loki
//! compatible) when `json` is set. Levels can be overridden per crate, e.g.
//! `chainscan_substrate = "debug"` to see every RPC round trip.

pub mod tracing_setup;

pub use tracing_setup::{build_filter_directives, init_tracing, LogConfig};
