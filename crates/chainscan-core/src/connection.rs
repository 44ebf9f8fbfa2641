//! Chain connection traits and the scan-scoped [`ChainHandle`].
//!
//! The core only ever talks to a node through [`ChainConnection`]. Concrete
//! clients (e.g. `chainscan-substrate`) implement it together with a
//! [`ChainConnector`] that opens one connection per scan.

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{BlockHash, BlockHeader, RawEventRecord};

/// A live connection to one node, including whatever chain metadata the
/// implementation needs to decode event logs.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` so the owning scan can run on any
/// Tokio worker.
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// The endpoint this connection was opened against.
    fn endpoint(&self) -> &str;

    /// Number of the current best block.
    async fn current_head(&self) -> Result<u64, ScanError>;

    /// Hash of block `number`. Fails if the block is beyond the chain height
    /// or no longer available.
    async fn block_hash_at(&self, number: u64) -> Result<BlockHash, ScanError>;

    /// Header of the block with the given hash.
    async fn block_at(&self, hash: &BlockHash) -> Result<BlockHeader, ScanError>;

    /// Full event log recorded at `hash`, in emission order.
    async fn events_at(&self, hash: &BlockHash) -> Result<Vec<RawEventRecord>, ScanError>;

    /// Release transport resources. Must be idempotent.
    fn close(&self);
}

/// Opens [`ChainConnection`]s by endpoint address.
#[async_trait]
pub trait ChainConnector: Send + Sync + 'static {
    type Connection: ChainConnection + 'static;

    /// Connect and load chain metadata. Must not hang on an unreachable
    /// endpoint.
    async fn open(&self, endpoint: &str) -> Result<Self::Connection, ScanError>;
}

/// Exclusive owner of one connection for the lifetime of one scan.
///
/// The connection is closed on [`ChainHandle::close`] or on drop, whichever
/// happens first, so aborting the owning task also releases it.
pub struct ChainHandle<C: ChainConnection> {
    conn: C,
}

impl<C: ChainConnection> ChainHandle<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    /// Open a connection through `connector` and take ownership of it.
    pub async fn open<K>(connector: &K, endpoint: &str) -> Result<Self, ScanError>
    where
        K: ChainConnector<Connection = C>,
    {
        tracing::info!(endpoint, "opening chain connection");
        let conn = connector.open(endpoint).await?;
        Ok(Self::new(conn))
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Close the connection now. Dropping the handle afterwards is a no-op
    /// for conforming connections.
    pub fn close(self) {
        drop(self);
    }
}

impl<C: ChainConnection> Drop for ChainHandle<C> {
    fn drop(&mut self) {
        tracing::debug!(endpoint = self.conn.endpoint(), "closing chain connection");
        self.conn.close();
    }
}

impl<C: ChainConnection> std::fmt::Debug for ChainHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHandle")
            .field("endpoint", &self.conn.endpoint())
            .finish()
    }
}
