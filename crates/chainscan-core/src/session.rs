//! Scan sessions: the caller-facing contract around one scan at a time.
//!
//! ```text
//! Idle → Connecting → Scanning → Completed
//!            │            │
//!            └────────────┴────→ Failed
//! ```
//!
//! Each [`ScanSession::run`] spawns a Tokio task that owns its own
//! [`ChainHandle`] and reports through a bounded channel wrapped in a
//! [`ScanStream`]. Starting a new run bumps the session generation and aborts
//! the previous task; the new task waits for that abort to finish, which drops
//! the old handle and closes its connection, before it opens its own. Anything
//! the old task still tries to emit under the stale generation is discarded.
//!
//! The channel carries only each block's new events. [`ScanStream`] keeps the
//! accumulated result, so a long scan never copies its whole history per block.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{ChainConnector, ChainHandle};
use crate::error::ScanError;
use crate::scanner::{BlockScanner, ScanSink};
use crate::types::{DecodedEvent, ScanProgress, ScanRequest, ScanResult};

/// Lifecycle of the session's current scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Scanning,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Scanning => write!(f, "scanning"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One item of a [`ScanStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScanUpdate {
    State(SessionState),
    /// 100 is only reported immediately before [`ScanUpdate::Completed`].
    Progress(ScanProgress),
    /// Events of the latest block. `total` events have been delivered so far;
    /// [`ScanStream::snapshot`] holds all of them.
    Snapshot {
        added: Vec<DecodedEvent>,
        total: usize,
    },
    /// Terminal: the whole range was scanned.
    Completed { events: ScanResult },
    /// Terminal: the scan stopped early. `delivered` events were already
    /// sent in snapshots and remain valid.
    Failed { error: ScanError, delivered: usize },
}

/// Session tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the update channel between the scan task and the caller.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Runs scans one at a time against chains opened by `K`.
pub struct ScanSession<K: ChainConnector> {
    connector: Arc<K>,
    config: SessionConfig,
    generation: Arc<AtomicU64>,
    state: Arc<Mutex<SessionState>>,
    active: Option<JoinHandle<()>>,
}

impl<K: ChainConnector> ScanSession<K> {
    pub fn new(connector: K, config: SessionConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            active: None,
        }
    }

    /// State of the most recent scan.
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Generation of the most recent scan (0 before the first run).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start scanning `request`, replacing any scan still in flight.
    ///
    /// An invalid request is rejected here, before any connection is opened,
    /// and leaves a running scan untouched.
    pub fn run(&mut self, request: ScanRequest) -> Result<ScanStream, ScanError> {
        request.validate()?;

        let generation = {
            let mut state = lock(&self.state);
            *state = SessionState::Idle;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        let previous = self.active.take();
        if let Some(previous) = &previous {
            tracing::info!(generation, "replacing in-flight scan");
            previous.abort();
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let emitter = Emitter {
            tx,
            generation,
            current: Arc::clone(&self.generation),
            state: Arc::clone(&self.state),
        };

        let connector = Arc::clone(&self.connector);
        self.active = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                // resolves once the old future, and its ChainHandle, are dropped
                let _ = previous.await;
            }
            drive(connector, request, emitter).await
        }));

        Ok(ScanStream::new(rx, generation))
    }

    /// Abort the scan in flight, if any. Its stream ends without a
    /// terminal update.
    pub fn cancel(&mut self) {
        let mut state = lock(&self.state);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = self.active.take() {
            tracing::info!("cancelling in-flight scan");
            active.abort();
            *state = SessionState::Failed;
        }
    }
}

impl<K: ChainConnector> Drop for ScanSession<K> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.abort();
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> std::sync::MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn drive<K: ChainConnector>(connector: Arc<K>, request: ScanRequest, mut emitter: Emitter) {
    let generation = emitter.generation;
    if emitter.set_state(SessionState::Connecting).await.is_err()
        || emitter.progress(ScanProgress::ZERO).await.is_err()
    {
        return;
    }

    let handle = match ChainHandle::open(connector.as_ref(), &request.endpoint).await {
        Ok(handle) => handle,
        Err(error) => {
            tracing::warn!(
                generation,
                endpoint = %request.endpoint,
                error = %error,
                "connection failed"
            );
            emitter.fail(error, 0).await;
            return;
        }
    };

    if emitter.set_state(SessionState::Scanning).await.is_err() {
        return;
    }

    let outcome = BlockScanner::new(&handle)
        .scan(request.start_block, request.end_block, &mut emitter)
        .await;
    handle.close();

    match outcome {
        Ok(events) => {
            tracing::info!(generation, events = events.len(), "scan completed");
            if emitter.set_state(SessionState::Completed).await.is_ok() {
                let _ = emitter.send(ScanUpdate::Completed { events }).await;
            }
        }
        Err(aborted) => {
            tracing::warn!(
                generation,
                error = %aborted.error,
                delivered = aborted.partial.len(),
                last_block = ?aborted.last_block,
                "scan failed"
            );
            emitter.fail(aborted.error, aborted.partial.len()).await;
        }
    }
}

/// Sends updates for one generation, dropping them once it is stale.
struct Emitter {
    tx: mpsc::Sender<ScanUpdate>,
    generation: u64,
    current: Arc<AtomicU64>,
    state: Arc<Mutex<SessionState>>,
}

impl Emitter {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    async fn send(&self, update: ScanUpdate) -> Result<(), ScanError> {
        if !self.is_current() {
            return Err(ScanError::Cancelled);
        }
        self.tx.send(update).await.map_err(|_| ScanError::Cancelled)
    }

    async fn set_state(&self, state: SessionState) -> Result<(), ScanError> {
        {
            // generation changes happen under this lock too
            let mut current = lock(&self.state);
            if !self.is_current() {
                return Err(ScanError::Cancelled);
            }
            *current = state;
        }
        self.send(ScanUpdate::State(state)).await
    }

    async fn fail(&self, error: ScanError, delivered: usize) {
        if self.set_state(SessionState::Failed).await.is_ok() {
            let _ = self.send(ScanUpdate::Failed { error, delivered }).await;
        }
    }
}

#[async_trait]
impl ScanSink for Emitter {
    async fn batch(&mut self, snapshot: &[DecodedEvent], added: usize) -> Result<(), ScanError> {
        let tail = snapshot.len().saturating_sub(added);
        self.send(ScanUpdate::Snapshot {
            added: snapshot[tail..].to_vec(),
            total: snapshot.len(),
        })
        .await
    }

    async fn progress(&mut self, progress: ScanProgress) -> Result<(), ScanError> {
        // the stream reports 100 together with Completed
        if progress.is_complete() {
            return Ok(());
        }
        self.send(ScanUpdate::Progress(progress)).await
    }
}

/// Updates of one scan, in emission order. Ends after the terminal update,
/// or early if the scan was replaced or cancelled.
#[derive(Debug)]
pub struct ScanStream {
    rx: mpsc::Receiver<ScanUpdate>,
    generation: u64,
    events: ScanResult,
    progress: ScanProgress,
    queued: Option<ScanUpdate>,
}

impl ScanStream {
    fn new(rx: mpsc::Receiver<ScanUpdate>, generation: u64) -> Self {
        Self {
            rx,
            generation,
            events: Vec::new(),
            progress: ScanProgress::ZERO,
            queued: None,
        }
    }

    /// Generation token of the scan this stream belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every event delivered so far, in block order.
    pub fn snapshot(&self) -> &[DecodedEvent] {
        &self.events
    }

    /// Last progress handed out by this stream.
    pub fn progress(&self) -> ScanProgress {
        self.progress
    }

    pub async fn next_update(&mut self) -> Option<ScanUpdate> {
        StreamExt::next(self).await
    }

    /// Drain the stream and summarize how the scan ended.
    pub async fn outcome(mut self) -> ScanOutcome {
        while let Some(update) = self.next_update().await {
            match update {
                ScanUpdate::Completed { events } => {
                    return ScanOutcome::Completed {
                        events,
                        progress: self.progress,
                    };
                }
                ScanUpdate::Failed { error, .. } => {
                    return ScanOutcome::Failed {
                        error,
                        events: std::mem::take(&mut self.events),
                        progress: self.progress,
                    };
                }
                _ => {}
            }
        }

        ScanOutcome::Failed {
            error: ScanError::Cancelled,
            events: std::mem::take(&mut self.events),
            progress: self.progress,
        }
    }

    /// Fold a received update into the stream state and pick what to hand
    /// out. `Completed` is preceded by a final `Progress(100)`.
    fn accept(&mut self, update: ScanUpdate) -> ScanUpdate {
        match update {
            ScanUpdate::Completed { .. } if !self.progress.is_complete() => {
                self.queued = Some(update);
                self.progress = ScanProgress::COMPLETE;
                ScanUpdate::Progress(ScanProgress::COMPLETE)
            }
            ScanUpdate::Progress(p) => {
                self.progress = p;
                update
            }
            ScanUpdate::Snapshot { ref added, .. } => {
                self.events.extend(added.iter().cloned());
                update
            }
            other => other,
        }
    }
}

impl Stream for ScanStream {
    type Item = ScanUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ScanUpdate>> {
        if let Some(update) = self.queued.take() {
            return Poll::Ready(Some(update));
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(update)) => Poll::Ready(Some(self.accept(update))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// How a scan ended, as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Completed {
        events: ScanResult,
        progress: ScanProgress,
    },
    /// `events` is the last snapshot delivered before the failure.
    Failed {
        error: ScanError,
        events: ScanResult,
        progress: ScanProgress,
    },
}

impl ScanOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn events(&self) -> &[DecodedEvent] {
        match self {
            Self::Completed { events, .. } | Self::Failed { events, .. } => events,
        }
    }

    pub fn progress(&self) -> ScanProgress {
        match self {
            Self::Completed { progress, .. } | Self::Failed { progress, .. } => *progress,
        }
    }

    pub fn error(&self) -> Option<&ScanError> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}
