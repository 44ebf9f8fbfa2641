//! [`ChainConnection`] for Substrate nodes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainscan_core::{
    BlockHash, BlockHeader, ChainConnection, ChainConnector, RawEventRecord, ScanError,
};

use crate::error::SubstrateError;
use crate::metadata::{ChainMetadata, SYSTEM_EVENTS_KEY};
use crate::rpc::{
    decode_hex_bytes, parse_hex_u64, HeaderJson, RuntimeVersionJson, SignedBlockJson,
};
use crate::ws::{WsConfig, WsTransport};

/// Public Polkadot relay-chain RPC.
pub const DEFAULT_ENDPOINT: &str = "wss://rpc.polkadot.io";

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Connection settings for [`SubstrateConnector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Bound on the WebSocket handshake plus the initial metadata load.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-request bound. Absent means no bound while the socket is open.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
        }
    }
}

impl ConnectionConfig {
    fn ws_config(&self) -> WsConfig {
        WsConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Opens one [`SubstrateConnection`] per scan.
#[derive(Debug, Clone, Default)]
pub struct SubstrateConnector {
    config: ConnectionConfig,
}

impl SubstrateConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl ChainConnector for SubstrateConnector {
    type Connection = SubstrateConnection;

    async fn open(&self, endpoint: &str) -> Result<SubstrateConnection, ScanError> {
        let ws = self.config.ws_config();
        let transport = WsTransport::connect(endpoint, &ws)
            .await
            .map_err(|e| e.into_connection(endpoint))?;
        let conn = SubstrateConnection::new(transport);

        // The handshake is not done until decoding is possible.
        let metadata = tokio::time::timeout(ws.connect_timeout, conn.metadata_at(None))
            .await
            .map_err(|_| {
                SubstrateError::Timeout {
                    ms: self.config.connect_timeout_ms,
                }
                .into_connection(endpoint)
            })?
            .map_err(|e| e.into_connection(endpoint))?;

        tracing::info!(
            endpoint,
            spec_version = metadata.spec_version(),
            metadata_version = metadata.version(),
            "connected"
        );
        Ok(conn)
    }
}

/// A live connection to a Substrate node.
///
/// Metadata is cached per runtime spec version, so a scan across a runtime
/// upgrade decodes each block with the metadata that was in force there.
pub struct SubstrateConnection {
    transport: WsTransport,
    metadata: Mutex<HashMap<u32, Arc<ChainMetadata>>>,
}

impl SubstrateConnection {
    pub fn new(transport: WsTransport) -> Self {
        Self {
            transport,
            metadata: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<u32, Arc<ChainMetadata>>> {
        self.metadata.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runtime spec version at `at`, or at the best block.
    pub async fn spec_version(&self, at: Option<&BlockHash>) -> Result<u32, SubstrateError> {
        let version: RuntimeVersionJson = self
            .transport
            .request("state_getRuntimeVersion", at_param(at))
            .await?;
        Ok(version.spec_version)
    }

    /// Metadata in force at `at`, or at the best block.
    pub async fn metadata_at(
        &self,
        at: Option<&BlockHash>,
    ) -> Result<Arc<ChainMetadata>, SubstrateError> {
        let spec_version = self.spec_version(at).await?;
        let cached = self.cache().get(&spec_version).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let raw: String = self
            .transport
            .request("state_getMetadata", at_param(at))
            .await?;
        let metadata = Arc::new(ChainMetadata::from_bytes(
            spec_version,
            &decode_hex_bytes(&raw)?,
        )?);
        tracing::info!(
            spec_version,
            metadata_version = metadata.version(),
            types = metadata.types().types.len(),
            "loaded runtime metadata"
        );
        self.cache().insert(spec_version, metadata.clone());
        Ok(metadata)
    }

    /// Number of distinct runtime versions loaded so far.
    pub fn cached_runtimes(&self) -> usize {
        self.cache().len()
    }
}

fn at_param(at: Option<&BlockHash>) -> Vec<Value> {
    match at {
        Some(hash) => vec![json!(hash.as_str())],
        None => vec![],
    }
}

#[async_trait]
impl ChainConnection for SubstrateConnection {
    fn endpoint(&self) -> &str {
        self.transport.url()
    }

    async fn current_head(&self) -> Result<u64, ScanError> {
        let header: HeaderJson = self.transport.request("chain_getHeader", vec![]).await?;
        Ok(parse_hex_u64(&header.number)?)
    }

    async fn block_hash_at(&self, number: u64) -> Result<BlockHash, ScanError> {
        let hash: Option<String> = self
            .transport
            .request("chain_getBlockHash", vec![json!(number)])
            .await?;
        match hash {
            Some(hash) => Ok(BlockHash::new(hash)),
            None => Err(ScanError::query(format!("no block hash for block {number}"))),
        }
    }

    async fn block_at(&self, hash: &BlockHash) -> Result<BlockHeader, ScanError> {
        let block: Option<SignedBlockJson> = self
            .transport
            .request("chain_getBlock", vec![json!(hash.as_str())])
            .await?;
        let header = block
            .ok_or_else(|| ScanError::query(format!("block {hash} not found")))?
            .block
            .header;
        Ok(BlockHeader {
            number: parse_hex_u64(&header.number)?,
            hash: hash.clone(),
            parent_hash: BlockHash::new(header.parent_hash),
        })
    }

    async fn events_at(&self, hash: &BlockHash) -> Result<Vec<RawEventRecord>, ScanError> {
        let metadata = self.metadata_at(Some(hash)).await?;
        let raw: Option<String> = self
            .transport
            .request(
                "state_getStorage",
                vec![json!(SYSTEM_EVENTS_KEY), json!(hash.as_str())],
            )
            .await?;
        match raw {
            None => Ok(Vec::new()),
            Some(raw) => Ok(metadata.decode_events(&decode_hex_bytes(&raw)?)?),
        }
    }

    fn close(&self) {
        if !self.transport.is_closed() {
            tracing::debug!(endpoint = self.transport.url(), "closing connection");
        }
        self.transport.close();
    }
}

impl std::fmt::Debug for SubstrateConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubstrateConnection")
            .field("transport", &self.transport)
            .field("cached_runtimes", &self.cached_runtimes())
            .finish()
    }
}
