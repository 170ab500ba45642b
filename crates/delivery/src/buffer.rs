//! In-memory buffering layer
//!
//! `BufferLayer` keeps one bounded queue per match key. Records arriving
//! from the ingest channel are admitted only when the currently-applied
//! routing table resolves their key (exact key first, then the wildcard);
//! everything else is counted and dropped. A full queue evicts its oldest
//! entry so ingest never blocks on a slow destination.
//!
//! The layer implements `RouteConsumer`: the publisher swaps a new table
//! in atomically and readers on the hot path never block.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use dashmap::DashMap;
use shunt_routing::{RouteConsumer, RoutingTable};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Record;

/// Default cap on buffered bytes per key (16 MiB)
pub const DEFAULT_MAX_KEY_BYTES: usize = 16 * 1024 * 1024;

/// Metrics for the buffering layer
#[derive(Debug, Default)]
pub struct BufferMetrics {
    /// Records admitted into a queue
    pub records_buffered: AtomicU64,

    /// Payload bytes admitted into a queue
    pub bytes_buffered: AtomicU64,

    /// Records dropped because no route matched their key
    pub records_unroutable: AtomicU64,

    /// Oldest entries evicted by queue overflow
    pub records_evicted: AtomicU64,

    /// Records handed to the sender
    pub records_drained: AtomicU64,
}

impl BufferMetrics {
    #[inline]
    fn record_buffered(&self, bytes: u64) {
        self.records_buffered.fetch_add(1, Ordering::Relaxed);
        self.bytes_buffered.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    fn record_unroutable(&self) {
        self.records_unroutable.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_evicted(&self) {
        self.records_evicted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_drained(&self, count: u64) {
        self.records_drained.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            records_buffered: self.records_buffered.load(Ordering::Relaxed),
            bytes_buffered: self.bytes_buffered.load(Ordering::Relaxed),
            records_unroutable: self.records_unroutable.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            records_drained: self.records_drained.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of buffer metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferSnapshot {
    pub records_buffered: u64,
    pub bytes_buffered: u64,
    pub records_unroutable: u64,
    pub records_evicted: u64,
    pub records_drained: u64,
}

/// One bounded per-key queue
#[derive(Debug, Default)]
struct KeyQueue {
    entries: VecDeque<Bytes>,
    bytes: usize,
}

/// Per-key bounded in-memory queues between ingest and the sender
pub struct BufferLayer {
    /// Routing table applied by the publisher fan-out
    table: ArcSwapOption<RoutingTable>,

    /// Queues keyed by match key
    queues: DashMap<String, KeyQueue>,

    /// Byte cap per key; overflow evicts the oldest entry
    max_key_bytes: usize,

    metrics: BufferMetrics,
}

impl BufferLayer {
    /// Create a buffer with the default per-key byte cap
    pub fn new() -> Self {
        Self::with_max_key_bytes(DEFAULT_MAX_KEY_BYTES)
    }

    /// Create a buffer with a custom per-key byte cap
    pub fn with_max_key_bytes(max_key_bytes: usize) -> Self {
        Self {
            table: ArcSwapOption::const_empty(),
            queues: DashMap::new(),
            max_key_bytes,
            metrics: BufferMetrics::default(),
        }
    }

    /// Get the buffer metrics
    #[inline]
    pub fn metrics(&self) -> &BufferMetrics {
        &self.metrics
    }

    /// Admit one record
    ///
    /// Returns `false` when no applied route matches the record's key; the
    /// record is counted and dropped. A queue past its byte cap evicts its
    /// oldest entries, never the one just admitted.
    pub fn push(&self, record: Record) -> bool {
        let routable = self
            .table
            .load()
            .as_ref()
            .is_some_and(|table| table.resolve(&record.key).is_some());
        if !routable {
            self.metrics.record_unroutable();
            tracing::trace!(key = %record.key, "no route for record, dropping");
            return false;
        }

        let len = record.payload.len();
        let mut queue = self.queues.entry(record.key).or_default();
        queue.entries.push_back(record.payload);
        queue.bytes += len;

        while queue.bytes > self.max_key_bytes && queue.entries.len() > 1 {
            if let Some(evicted) = queue.entries.pop_front() {
                queue.bytes = queue.bytes.saturating_sub(evicted.len());
                self.metrics.record_evicted();
            }
        }

        self.metrics.record_buffered(len as u64);
        true
    }

    /// Keys that currently hold buffered data
    pub fn keys(&self) -> Vec<String> {
        self.queues
            .iter()
            .filter(|entry| !entry.entries.is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Bytes currently queued for one key
    pub fn key_bytes(&self, key: &str) -> usize {
        self.queues.get(key).map_or(0, |queue| queue.bytes)
    }

    /// Pop queued payloads for one key, up to `max_bytes`
    ///
    /// The first entry is always drained even when it alone exceeds the
    /// budget, so an oversized payload cannot wedge its queue.
    pub fn drain(&self, key: &str, max_bytes: usize) -> Vec<Bytes> {
        let Some(mut queue) = self.queues.get_mut(key) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut total = 0usize;
        while let Some(front_len) = queue.entries.front().map(Bytes::len) {
            if !out.is_empty() && total + front_len > max_bytes {
                break;
            }
            let Some(payload) = queue.entries.pop_front() else {
                break;
            };
            queue.bytes = queue.bytes.saturating_sub(payload.len());
            total += payload.len();
            out.push(payload);
            if total >= max_bytes {
                break;
            }
        }

        self.metrics.record_drained(out.len() as u64);
        out
    }

    /// Move records from the ingest channel into the buffer until cancelled
    /// or the channel closes
    pub async fn pump(self: Arc<Self>, mut receiver: mpsc::Receiver<Record>, cancel: CancellationToken) {
        tracing::info!(max_key_bytes = self.max_key_bytes, "buffer pump starting");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => {
                    match received {
                        Some(record) => {
                            self.push(record);
                        }
                        None => break,
                    }
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            records_buffered = snapshot.records_buffered,
            records_unroutable = snapshot.records_unroutable,
            records_evicted = snapshot.records_evicted,
            records_drained = snapshot.records_drained,
            "buffer pump stopping"
        );
    }
}

impl Default for BufferLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteConsumer for BufferLayer {
    fn name(&self) -> &str {
        "buffer"
    }

    fn apply_routing_table(&self, table: &Arc<RoutingTable>) {
        self.table.store(Some(Arc::clone(table)));
        tracing::debug!(consumer = "buffer", routes = table.len(), "routing table applied");
    }
}

impl std::fmt::Debug for BufferLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLayer")
            .field("queues", &self.queues.len())
            .field("max_key_bytes", &self.max_key_bytes)
            .finish()
    }
}
