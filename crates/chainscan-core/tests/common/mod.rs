//! In-memory chain used by the scanner and session tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use chainscan_core::{
    BlockHash, BlockHeader, ChainConnection, ChainConnector, FieldMeta, Phase, RawEventRecord,
    ScanError,
};

/// Records every call made against the mock chain.
#[derive(Debug, Default)]
pub struct CallLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub hashes: Mutex<Vec<u64>>,
    pub events: Mutex<Vec<u64>>,
    /// `"open"` / `"close"` in the order they happened.
    pub lifecycle: Mutex<Vec<&'static str>>,
}

impl CallLog {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn hashes(&self) -> Vec<u64> {
        self.hashes.lock().unwrap().clone()
    }

    pub fn lifecycle(&self) -> Vec<&'static str> {
        self.lifecycle.lock().unwrap().clone()
    }
}

#[derive(Debug, Default)]
pub struct MockChain {
    pub head: u64,
    pub blocks: HashMap<u64, Vec<RawEventRecord>>,
    pub failing_events: HashSet<u64>,
    pub block_delay: Option<Duration>,
    pub log: Arc<CallLog>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }

    /// Put `count` transfer events into `block`.
    pub fn with_events(mut self, block: u64, count: u32) -> Self {
        self.blocks
            .insert(block, (0..count).map(|i| transfer(block, i)).collect());
        self
    }

    /// Make the event-log query for `block` fail.
    pub fn failing_at(mut self, block: u64) -> Self {
        self.failing_events.insert(block);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.block_delay = Some(delay);
        self
    }

    pub fn connector(self) -> (MockConnector, Arc<CallLog>) {
        let log = Arc::clone(&self.log);
        (
            MockConnector {
                chain: Arc::new(self),
                refuse: false,
            },
            log,
        )
    }

    /// A connection that bypasses the connector, for scanner tests.
    pub fn connect(self) -> (MockConnection, Arc<CallLog>) {
        let log = Arc::clone(&self.log);
        log.opens.fetch_add(1, Ordering::SeqCst);
        (MockConnection::new(Arc::new(self), "mock://chain"), log)
    }
}

pub fn transfer(block: u64, i: u32) -> RawEventRecord {
    RawEventRecord {
        section: "balances".into(),
        method: "Transfer".into(),
        phase: Phase::ApplyExtrinsic,
        extrinsic_index: Some(i),
        values: vec![json!(block * 1_000 + i as u64)],
        fields: vec![FieldMeta::named("amount", "T::Balance")],
        docs: vec!["Transfer succeeded.".into()],
    }
}

fn hash_of(number: u64) -> BlockHash {
    BlockHash::new(format!("0x{number:064x}"))
}

fn number_of(hash: &BlockHash) -> Result<u64, ScanError> {
    u64::from_str_radix(hash.as_str().trim_start_matches("0x"), 16)
        .map_err(|e| ScanError::query(format!("bad hash {hash}: {e}")))
}

pub struct MockConnection {
    chain: Arc<MockChain>,
    endpoint: String,
    closed: AtomicBool,
}

impl MockConnection {
    fn new(chain: Arc<MockChain>, endpoint: &str) -> Self {
        Self {
            chain,
            endpoint: endpoint.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), ScanError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ScanError::query("connection closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainConnection for MockConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn current_head(&self) -> Result<u64, ScanError> {
        self.ensure_open()?;
        Ok(self.chain.head)
    }

    async fn block_hash_at(&self, number: u64) -> Result<BlockHash, ScanError> {
        self.ensure_open()?;
        self.chain.log.hashes.lock().unwrap().push(number);
        if let Some(delay) = self.chain.block_delay {
            tokio::time::sleep(delay).await;
        }
        if number > self.chain.head {
            return Err(ScanError::query(format!("block {number} beyond head")));
        }
        Ok(hash_of(number))
    }

    async fn block_at(&self, hash: &BlockHash) -> Result<BlockHeader, ScanError> {
        self.ensure_open()?;
        let number = number_of(hash)?;
        Ok(BlockHeader {
            number,
            hash: hash.clone(),
            parent_hash: hash_of(number.saturating_sub(1)),
        })
    }

    async fn events_at(&self, hash: &BlockHash) -> Result<Vec<RawEventRecord>, ScanError> {
        self.ensure_open()?;
        let number = number_of(hash)?;
        self.chain.log.events.lock().unwrap().push(number);
        if self.chain.failing_events.contains(&number) {
            return Err(ScanError::query("state pruned"));
        }
        Ok(self.chain.blocks.get(&number).cloned().unwrap_or_default())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.chain.log.closes.fetch_add(1, Ordering::SeqCst);
            self.chain.log.lifecycle.lock().unwrap().push("close");
        }
    }
}

pub struct MockConnector {
    chain: Arc<MockChain>,
    pub refuse: bool,
}

impl MockConnector {
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }
}

#[async_trait]
impl ChainConnector for MockConnector {
    type Connection = MockConnection;

    async fn open(&self, endpoint: &str) -> Result<MockConnection, ScanError> {
        self.chain.log.opens.fetch_add(1, Ordering::SeqCst);
        self.chain.log.lifecycle.lock().unwrap().push("open");
        if self.refuse {
            return Err(ScanError::connection(endpoint, "connection refused"));
        }
        Ok(MockConnection::new(Arc::clone(&self.chain), endpoint))
    }
}

/// Poll `cond` until it holds or a second passes.
pub async fn wait_until(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
