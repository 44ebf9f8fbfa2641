//! chainscan-substrate: Substrate (Polkadot/Kusama) chain connection.
//!
//! Provides [`SubstrateConnector`], a [`chainscan_core::ChainConnector`] that
//! talks JSON-RPC over WebSocket and decodes `System.Events` with the
//! runtime's own metadata (V14/V15).
//!
//! # Usage
//!
//! ```rust,no_run
//! use chainscan_core::{ScanRequest, ScanSession, SessionConfig};
//! use chainscan_substrate::{ConnectionConfig, SubstrateConnector, DEFAULT_ENDPOINT};
//!
//! # async fn example() -> Result<(), chainscan_core::ScanError> {
//! let connector = SubstrateConnector::new(ConnectionConfig::default());
//! let mut session = ScanSession::new(connector, SessionConfig::default());
//! let outcome = session
//!     .run(ScanRequest::new(DEFAULT_ENDPOINT, 20_000_000, 20_000_010))?
//!     .outcome()
//!     .await;
//! for event in outcome.events() {
//!     println!("#{} {}", event.block, event.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod metadata;
pub mod rpc;
pub mod value;
pub mod ws;

pub use connection::{ConnectionConfig, SubstrateConnection, SubstrateConnector, DEFAULT_ENDPOINT};
pub use error::SubstrateError;
pub use metadata::{ChainMetadata, SYSTEM_EVENTS_KEY};
pub use ws::{WsConfig, WsTransport};
