//! The block scanner: drives one connection across a bounded block range.
//!
//! For each block, strictly in order:
//!   - resolve the block hash
//!   - fetch the header and check it is the block we asked for
//!   - fetch the event log and decode every event
//!   - hand the accumulated result to the sink, then report progress
//!
//! A failure at any step aborts the scan. Events already handed to the sink
//! stay valid and are returned alongside the error.

use async_trait::async_trait;

use crate::connection::{ChainConnection, ChainHandle};
use crate::decoder;
use crate::error::ScanError;
use crate::types::{DecodedEvent, ScanProgress, ScanResult};

/// Receives incremental scan output.
///
/// Returning an error from either method stops the scan at that point; the
/// session uses this to cancel at block boundaries.
#[async_trait]
pub trait ScanSink: Send {
    /// Called after every block with the complete result so far.
    /// `added` is the number of events the latest block contributed.
    async fn batch(&mut self, snapshot: &[DecodedEvent], added: usize) -> Result<(), ScanError>;

    /// Called after every block, and once with 100 on completion.
    async fn progress(&mut self, progress: ScanProgress) -> Result<(), ScanError>;
}

/// A [`ScanSink`] made of two plain closures.
pub struct Callbacks<P, B> {
    on_progress: P,
    on_batch: B,
}

/// Build a sink from an `on_progress` and an `on_batch` closure.
pub fn callbacks<P, B>(on_progress: P, on_batch: B) -> Callbacks<P, B>
where
    P: FnMut(ScanProgress) + Send,
    B: FnMut(&[DecodedEvent]) + Send,
{
    Callbacks {
        on_progress,
        on_batch,
    }
}

#[async_trait]
impl<P, B> ScanSink for Callbacks<P, B>
where
    P: FnMut(ScanProgress) + Send,
    B: FnMut(&[DecodedEvent]) + Send,
{
    async fn batch(&mut self, snapshot: &[DecodedEvent], _added: usize) -> Result<(), ScanError> {
        (self.on_batch)(snapshot);
        Ok(())
    }

    async fn progress(&mut self, progress: ScanProgress) -> Result<(), ScanError> {
        (self.on_progress)(progress);
        Ok(())
    }
}

/// A scan that stopped before reaching the end of its range.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAborted {
    pub error: ScanError,
    /// Everything delivered to the sink before the failure.
    pub partial: ScanResult,
    /// Last block whose events were fully delivered, if any.
    pub last_block: Option<u64>,
}

/// The effective block range of a scan after clamping to the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub start: u64,
    pub end: u64,
}

impl ScanRange {
    /// Clamp `[start, end]` to `head`. Returns `None` when nothing is left.
    pub fn clamped(start: u64, end: u64, head: u64) -> Option<Self> {
        let end = end.min(head);
        (start <= end).then_some(Self { start, end })
    }

    pub fn total_blocks(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Sequential block-range scanner over a borrowed [`ChainHandle`].
pub struct BlockScanner<'a, C: ChainConnection> {
    handle: &'a ChainHandle<C>,
}

impl<'a, C: ChainConnection> BlockScanner<'a, C> {
    pub fn new(handle: &'a ChainHandle<C>) -> Self {
        Self { handle }
    }

    /// Scan `[start, end]`, reporting through `sink`.
    ///
    /// Returns the final result on success.
    pub async fn scan<S: ScanSink>(
        &self,
        start: u64,
        end: u64,
        sink: &mut S,
    ) -> Result<ScanResult, ScanAborted> {
        let mut events: ScanResult = Vec::new();
        let mut last_block = None;

        let abort = |error: ScanError, partial: ScanResult, last_block: Option<u64>| ScanAborted {
            error,
            partial,
            last_block,
        };

        let conn = self.handle.connection();
        let head = match conn.current_head().await {
            Ok(head) => head,
            Err(e) => return Err(abort(e, events, last_block)),
        };

        let Some(range) = ScanRange::clamped(start, end, head) else {
            tracing::info!(start, end, head, "start is above chain head, nothing to scan");
            if let Err(e) = sink.progress(ScanProgress::COMPLETE).await {
                return Err(abort(e, events, last_block));
            }
            return Ok(events);
        };

        let total = range.total_blocks();
        tracing::info!(
            start = range.start,
            end = range.end,
            requested_end = end,
            head,
            total,
            "starting block scan"
        );

        let mut last_progress = ScanProgress::ZERO;
        for number in range.start..=range.end {
            let added = match self.scan_block(number).await {
                Ok(batch) => {
                    let added = batch.len();
                    events.extend(batch);
                    added
                }
                Err(e) => {
                    tracing::warn!(block = number, error = %e, "block scan failed, aborting");
                    return Err(abort(e, events, last_block));
                }
            };
            last_block = Some(number);

            if let Err(e) = sink.batch(&events, added).await {
                return Err(abort(e, events, last_block));
            }

            last_progress = ScanProgress::of(number - range.start + 1, total);
            if let Err(e) = sink.progress(last_progress).await {
                return Err(abort(e, events, last_block));
            }

            tracing::debug!(
                block = number,
                events = added,
                progress = %last_progress,
                "block scanned"
            );
        }

        if !last_progress.is_complete() {
            if let Err(e) = sink.progress(ScanProgress::COMPLETE).await {
                return Err(abort(e, events, last_block));
            }
        }

        tracing::info!(
            start = range.start,
            end = range.end,
            events = events.len(),
            "block scan complete"
        );
        Ok(events)
    }

    async fn scan_block(&self, number: u64) -> Result<Vec<DecodedEvent>, ScanError> {
        let conn = self.handle.connection();

        let hash = conn
            .block_hash_at(number)
            .await
            .map_err(|e| e.at_block(number))?;

        let header = conn.block_at(&hash).await.map_err(|e| e.at_block(number))?;
        if header.number != number {
            return Err(ScanError::Query {
                block: Some(number),
                reason: format!("node returned block {} for hash {hash}", header.number),
            });
        }

        let records = conn.events_at(&hash).await.map_err(|e| e.at_block(number))?;
        Ok(decoder::decode_block(&records, number))
    }
}
