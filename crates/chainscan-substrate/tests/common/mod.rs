#![allow(dead_code)]

//! A miniature runtime (types + V14 metadata) and an in-process WebSocket
//! node serving it over JSON-RPC.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frame_metadata::v14::{
    ExtrinsicMetadata, PalletEventMetadata, PalletMetadata, PalletStorageMetadata,
    RuntimeMetadataV14, StorageEntryMetadata, StorageEntryModifier, StorageEntryType,
};
use frame_metadata::RuntimeMetadataPrefixed;
use futures::{SinkExt, StreamExt};
use parity_scale_codec::Encode;
use scale_info::{meta_type, TypeInfo};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

// ─── Runtime types ────────────────────────────────────────────────────────────

#[derive(Encode, TypeInfo)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

#[derive(Encode, TypeInfo)]
pub struct AccountId32(pub [u8; 32]);

#[derive(Encode, TypeInfo)]
pub enum DispatchClass {
    Normal,
    Operational,
    Mandatory,
}

#[derive(Encode, TypeInfo)]
pub enum Pays {
    Yes,
    No,
}

#[derive(Encode, TypeInfo)]
pub struct DispatchInfo {
    pub weight: u64,
    pub class: DispatchClass,
    pub pays_fee: Pays,
}

#[derive(Encode, TypeInfo)]
pub enum SystemEvent {
    /// An extrinsic completed successfully.
    ExtrinsicSuccess { dispatch_info: DispatchInfo },
    /// A new account was created.
    NewAccount { account: AccountId32 },
}

#[derive(Encode, TypeInfo)]
pub enum BalancesEvent {
    /// Transfer succeeded.
    Transfer {
        from: AccountId32,
        to: AccountId32,
        amount: u128,
    },
    /// Some amount was deposited (e.g. for transaction fees).
    Deposit { who: AccountId32, amount: u128 },
}

#[derive(Encode, TypeInfo)]
pub enum RuntimeEvent {
    #[codec(index = 0)]
    System(SystemEvent),
    #[codec(index = 5)]
    Balances(BalancesEvent),
}

#[derive(Encode, TypeInfo)]
pub struct EventRecord {
    pub phase: Phase,
    pub event: RuntimeEvent,
    pub topics: Vec<[u8; 32]>,
}

pub fn record(phase: Phase, event: RuntimeEvent) -> EventRecord {
    EventRecord {
        phase,
        event,
        topics: vec![],
    }
}

pub fn account(byte: u8) -> AccountId32 {
    AccountId32([byte; 32])
}

pub fn transfer(from: u8, to: u8, amount: u128) -> RuntimeEvent {
    RuntimeEvent::Balances(BalancesEvent::Transfer {
        from: account(from),
        to: account(to),
        amount,
    })
}

pub fn extrinsic_success(weight: u64) -> RuntimeEvent {
    RuntimeEvent::System(SystemEvent::ExtrinsicSuccess {
        dispatch_info: DispatchInfo {
            weight,
            class: DispatchClass::Normal,
            pays_fee: Pays::Yes,
        },
    })
}

pub fn encode_events(records: &[EventRecord]) -> Vec<u8> {
    records.encode()
}

/// The runtime after an upgrade that adds `Balances::Burned`.
pub mod upgraded {
    use parity_scale_codec::Encode;
    use scale_info::TypeInfo;

    use super::{account, AccountId32, Phase, SystemEvent};

    #[derive(Encode, TypeInfo)]
    pub enum BalancesEvent {
        /// Transfer succeeded.
        Transfer {
            from: AccountId32,
            to: AccountId32,
            amount: u128,
        },
        /// Some amount was deposited (e.g. for transaction fees).
        Deposit { who: AccountId32, amount: u128 },
        /// Some amount was burned from an account.
        Burned { who: AccountId32, amount: u128 },
    }

    #[derive(Encode, TypeInfo)]
    pub enum RuntimeEvent {
        #[codec(index = 0)]
        System(SystemEvent),
        #[codec(index = 5)]
        Balances(BalancesEvent),
    }

    #[derive(Encode, TypeInfo)]
    pub struct EventRecord {
        pub phase: Phase,
        pub event: RuntimeEvent,
        pub topics: Vec<[u8; 32]>,
    }

    pub fn burned(who: u8, amount: u128) -> EventRecord {
        EventRecord {
            phase: Phase::ApplyExtrinsic(0),
            event: RuntimeEvent::Balances(BalancesEvent::Burned {
                who: account(who),
                amount,
            }),
            topics: vec![],
        }
    }

    pub fn metadata_bytes() -> Vec<u8> {
        super::encode_metadata(vec![
            super::system_pallet::<EventRecord>(true),
            super::balances_pallet::<BalancesEvent>(),
        ])
    }
}

// ─── Metadata ─────────────────────────────────────────────────────────────────

fn system_pallet<R: TypeInfo + 'static>(with_events_storage: bool) -> PalletMetadata {
    let entries = if with_events_storage {
        vec![StorageEntryMetadata {
            name: "Events",
            modifier: StorageEntryModifier::Default,
            ty: StorageEntryType::Plain(meta_type::<Vec<R>>()),
            default: vec![0],
            docs: vec![" Events deposited for the current block."],
        }]
    } else {
        vec![]
    };
    PalletMetadata {
        name: "System",
        storage: Some(PalletStorageMetadata {
            prefix: "System",
            entries,
        }),
        calls: None,
        event: Some(PalletEventMetadata {
            ty: meta_type::<SystemEvent>(),
        }),
        constants: vec![],
        error: None,
        index: 0,
    }
}

fn balances_pallet<E: TypeInfo + 'static>() -> PalletMetadata {
    PalletMetadata {
        name: "Balances",
        storage: None,
        calls: None,
        event: Some(PalletEventMetadata {
            ty: meta_type::<E>(),
        }),
        constants: vec![],
        error: None,
        index: 5,
    }
}

fn encode_metadata(pallets: Vec<PalletMetadata>) -> Vec<u8> {
    let extrinsic = ExtrinsicMetadata {
        ty: meta_type::<()>(),
        version: 4,
        signed_extensions: vec![],
    };
    let metadata = RuntimeMetadataV14::new(pallets, extrinsic, meta_type::<()>());
    RuntimeMetadataPrefixed::from(metadata).encode()
}

/// V14 metadata for the miniature runtime.
pub fn metadata_bytes() -> Vec<u8> {
    encode_metadata(vec![
        system_pallet::<EventRecord>(true),
        balances_pallet::<BalancesEvent>(),
    ])
}

/// Metadata whose System pallet has no `Events` storage entry.
pub fn metadata_without_events() -> Vec<u8> {
    encode_metadata(vec![
        system_pallet::<EventRecord>(false),
        balances_pallet::<BalancesEvent>(),
    ])
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn block_hash(n: u64) -> String {
    format!("0x{n:064x}")
}

// ─── Fake node ────────────────────────────────────────────────────────────────

/// What the fake node serves.
#[derive(Clone, Default)]
pub struct FakeChain {
    pub head: u64,
    pub spec_version: u32,
    pub metadata: Vec<u8>,
    pub events: HashMap<u64, Vec<u8>>,
    pub pruned: HashSet<u64>,
    /// From this block on, serve this spec version and metadata instead.
    pub upgrade: Option<(u64, u32, Vec<u8>)>,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            spec_version: 9430,
            metadata: metadata_bytes(),
            ..Self::default()
        }
    }

    pub fn with_events(mut self, block: u64, records: &[EventRecord]) -> Self {
        self.events.insert(block, encode_events(records));
        self
    }

    pub fn pruned(mut self, block: u64) -> Self {
        self.pruned.insert(block);
        self
    }

    /// Store an already encoded event log for `block`.
    pub fn with_encoded_events(mut self, block: u64, bytes: Vec<u8>) -> Self {
        self.events.insert(block, bytes);
        self
    }

    /// Switch to the [`upgraded`] runtime at `block`.
    pub fn upgraded_at(mut self, block: u64, spec_version: u32) -> Self {
        self.upgrade = Some((block, spec_version, upgraded::metadata_bytes()));
        self
    }

    /// Spec version and metadata in force at block `n`.
    fn runtime_at(&self, n: u64) -> (u32, &[u8]) {
        match &self.upgrade {
            Some((from, spec_version, metadata)) if n >= *from => (*spec_version, metadata),
            _ => (self.spec_version, &self.metadata),
        }
    }

    fn block_of(&self, params: &Value, index: usize) -> Option<u64> {
        let hash = params.get(index)?.as_str()?;
        u64::from_str_radix(hash.trim_start_matches("0x"), 16).ok()
    }

    fn header(&self, n: u64) -> Value {
        json!({
            "number": format!("{n:#x}"),
            "parentHash": block_hash(n.saturating_sub(1)),
            "stateRoot": block_hash(0),
            "extrinsicsRoot": block_hash(0),
            "digest": { "logs": [] },
        })
    }

    fn answer(&self, method: &str, params: &Value) -> Result<Value, Value> {
        match method {
            "chain_getHeader" => Ok(self.header(self.head)),
            "chain_getBlockHash" => {
                let n = params.get(0).and_then(Value::as_u64).unwrap_or(self.head);
                if n > self.head || self.pruned.contains(&n) {
                    Ok(Value::Null)
                } else {
                    Ok(json!(block_hash(n)))
                }
            }
            "chain_getBlock" => match self.block_of(params, 0) {
                Some(n) if n <= self.head => Ok(json!({
                    "block": { "header": self.header(n), "extrinsics": [] },
                    "justifications": null,
                })),
                _ => Ok(Value::Null),
            },
            "state_getRuntimeVersion" => {
                let n = self.block_of(params, 0).unwrap_or(self.head);
                Ok(json!({
                    "specName": "miniature",
                    "specVersion": self.runtime_at(n).0,
                    "implVersion": 0,
                    "transactionVersion": 1,
                }))
            }
            "state_getMetadata" => {
                let n = self.block_of(params, 0).unwrap_or(self.head);
                Ok(json!(to_hex(self.runtime_at(n).1)))
            }
            "state_getStorage" => match self.block_of(params, 1) {
                Some(n) => Ok(self
                    .events
                    .get(&n)
                    .map(|bytes| json!(to_hex(bytes)))
                    .unwrap_or(Value::Null)),
                None => Err(json!({"code": -32602, "message": "Invalid params"})),
            },
            other => Err(json!({"code": -32601, "message": format!("Method not found: {other}")})),
        }
    }
}

/// Counters observed by the fake node.
#[derive(Default)]
pub struct NodeLog {
    pub connections: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub methods: Mutex<Vec<String>>,
}

impl NodeLog {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods
            .lock()
            .unwrap()
            .iter()
            .filter(|m| *m == method)
            .count()
    }
}

pub struct FakeNode {
    pub url: String,
    pub log: Arc<NodeLog>,
}

impl FakeNode {
    pub async fn spawn(chain: FakeChain) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let log = Arc::new(NodeLog::default());
        let chain = Arc::new(chain);

        let accept_log = log.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(serve(tcp, chain.clone(), accept_log.clone()));
            }
        });

        Self { url, log }
    }
}

async fn serve(tcp: TcpStream, chain: Arc<FakeChain>, log: Arc<NodeLog>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
        return;
    };
    log.connections.fetch_add(1, Ordering::SeqCst);

    while let Some(Ok(msg)) = ws.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let req: Value = serde_json::from_str(text.as_str()).unwrap();
        let method = req["method"].as_str().unwrap_or_default().to_string();
        log.methods.lock().unwrap().push(method.clone());

        let resp = match chain.answer(&method, &req["params"]) {
            Ok(result) => json!({"jsonrpc": "2.0", "id": req["id"], "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": req["id"], "error": error}),
        };
        if ws.send(Message::Text(resp.to_string().into())).await.is_err() {
            break;
        }
    }

    log.disconnects.fetch_add(1, Ordering::SeqCst);
}

/// A TCP listener that accepts connections but never completes the
/// WebSocket handshake.
pub async fn silent_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });
    url
}

/// An address nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
