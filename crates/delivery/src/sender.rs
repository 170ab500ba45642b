//! Remote sender layer
//!
//! `SenderLayer` periodically drains the buffer per key, resolves the
//! destination through its applied routing table, and writes the batch over
//! TCP (one connection per batch, each payload newline-terminated). Batches
//! that cannot be delivered are journaled; journaled segments are replayed
//! on later cycles, oldest first, acknowledging progress as destinations
//! recover. Replay is at-least-once: a partially delivered cycle is retried
//! from its last acknowledged offset.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use shunt_routing::{RouteConsumer, RoutingTable};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;

use crate::journal::{INTERNAL_KEY, SegmentReader};
use crate::{BufferLayer, JournalLayer};

/// Configuration for the sender layer
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Delay between send cycles
    pub send_interval: Duration,

    /// Byte budget per key per cycle
    pub max_send_bytes: usize,

    /// Connection timeout per destination attempt
    pub connect_timeout: Duration,

    /// Write timeout per batch
    pub write_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(1),
            max_send_bytes: 1024 * 1024,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl SenderConfig {
    /// Set the delay between send cycles
    #[must_use]
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Set the per-key byte budget per cycle
    #[must_use]
    pub fn with_max_send_bytes(mut self, bytes: usize) -> Self {
        self.max_send_bytes = bytes;
        self
    }

    /// Set the connection timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Metrics for the sender layer
#[derive(Debug, Default)]
pub struct SenderMetrics {
    /// Batches delivered to a destination
    pub batches_sent: AtomicU64,

    /// Records delivered to a destination
    pub records_sent: AtomicU64,

    /// Wire bytes written (newline terminators included)
    pub bytes_sent: AtomicU64,

    /// Batches that failed every destination in their group
    pub delivery_failures: AtomicU64,

    /// Records journaled after failed delivery
    pub records_journaled: AtomicU64,

    /// Records delivered from journal replay
    pub records_replayed: AtomicU64,
}

impl SenderMetrics {
    #[inline]
    fn record_sent(&self, records: u64, bytes: u64) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.records_sent.fetch_add(records, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_journaled(&self) {
        self.records_journaled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_replayed(&self, records: u64) {
        self.records_replayed.fetch_add(records, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> SenderSnapshot {
        SenderSnapshot {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            records_journaled: self.records_journaled.load(Ordering::Relaxed),
            records_replayed: self.records_replayed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of sender metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderSnapshot {
    pub batches_sent: u64,
    pub records_sent: u64,
    pub bytes_sent: u64,
    pub delivery_failures: u64,
    pub records_journaled: u64,
    pub records_replayed: u64,
}

/// Drains the buffer to routed destinations, with journal fallback
pub struct SenderLayer {
    buffer: Arc<BufferLayer>,
    journal: Arc<JournalLayer>,

    /// Routing table applied by the publisher fan-out
    table: ArcSwapOption<RoutingTable>,

    config: SenderConfig,
    metrics: SenderMetrics,
}

impl SenderLayer {
    /// Create a sender with the default configuration
    pub fn new(buffer: Arc<BufferLayer>, journal: Arc<JournalLayer>) -> Self {
        Self::with_config(buffer, journal, SenderConfig::default())
    }

    /// Create a sender with a custom configuration
    pub fn with_config(
        buffer: Arc<BufferLayer>,
        journal: Arc<JournalLayer>,
        config: SenderConfig,
    ) -> Self {
        Self {
            buffer,
            journal,
            table: ArcSwapOption::const_empty(),
            config,
            metrics: SenderMetrics::default(),
        }
    }

    /// Get the sender metrics
    #[inline]
    pub fn metrics(&self) -> &SenderMetrics {
        &self.metrics
    }

    /// Run send cycles until cancelled
    ///
    /// One final cycle runs after cancellation so a prompt shutdown does
    /// not strand freshly buffered records.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.config.send_interval.as_millis() as u64,
            max_send_bytes = self.config.max_send_bytes,
            "sender starting"
        );

        let mut ticker = tokio::time::interval(self.config.send_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.send_cycle().await,
            }
        }

        self.send_cycle().await;

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            batches_sent = snapshot.batches_sent,
            records_sent = snapshot.records_sent,
            bytes_sent = snapshot.bytes_sent,
            delivery_failures = snapshot.delivery_failures,
            records_journaled = snapshot.records_journaled,
            records_replayed = snapshot.records_replayed,
            "sender stopping"
        );
    }

    /// One pass: drain the buffer, then replay the oldest journal segment
    pub(crate) async fn send_cycle(&self) {
        self.flush_buffer().await;
        self.replay_journal().await;
    }

    async fn flush_buffer(&self) {
        for key in self.buffer.keys() {
            let batch = self.buffer.drain(&key, self.config.max_send_bytes);
            if batch.is_empty() {
                continue;
            }
            let records = batch.len() as u64;

            match self.deliver(&key, &batch).await {
                Ok(written) => {
                    self.metrics.record_sent(records, written);
                    tracing::trace!(key = %key, records, bytes = written, "batch delivered");
                }
                Err(e) => {
                    self.metrics.record_failure();
                    tracing::warn!(key = %key, records, error = %e, "delivery failed, journaling batch");
                    for payload in &batch {
                        if let Err(e) = self.journal.append(&key, payload) {
                            tracing::error!(key = %key, error = %e, "journal fallback failed, record lost");
                        } else {
                            self.metrics.record_journaled();
                        }
                    }
                }
            }
        }
    }

    async fn replay_journal(&self) {
        let segments = match self.journal.segments() {
            Ok(segments) => segments,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list journal segments");
                return;
            }
        };
        let Some(name) = segments.into_iter().next() else {
            return;
        };

        let start = self.journal.acknowledged(&name).unwrap_or(0);
        let mut reader = match SegmentReader::open_at(self.journal.segment_path(&name), start) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(segment = %name, error = %e, "cannot open journal segment");
                return;
            }
        };

        // Collect one cycle's worth of entries, grouped by key. Internal
        // records advance the offset but are never forwarded.
        let mut batches: HashMap<String, Vec<Bytes>> = HashMap::new();
        let mut budget = self.config.max_send_bytes;
        let mut end = start;
        let mut complete = false;
        loop {
            match reader.read_entry() {
                Ok(Some(entry)) => {
                    let len = entry.payload.len();
                    if len > budget && end > start {
                        break;
                    }
                    budget = budget.saturating_sub(len);
                    end = reader.position();
                    if entry.key != INTERNAL_KEY {
                        batches.entry(entry.key).or_default().push(Bytes::from(entry.payload));
                    }
                }
                Ok(None) => {
                    complete = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        segment = %name,
                        error = %e,
                        "journal segment unreadable, discarding remainder"
                    );
                    if let Err(e) = self.journal.remove_segment(&name) {
                        tracing::warn!(segment = %name, error = %e, "failed to remove unreadable segment");
                    }
                    return;
                }
            }
        }

        for (key, batch) in &batches {
            let records = batch.len() as u64;
            if let Err(e) = self.deliver(key, batch).await {
                tracing::debug!(key = %key, error = %e, "journal replay delivery failed, keeping segment");
                return;
            }
            self.metrics.record_replayed(records);
        }

        self.journal.acknowledge(name.clone(), end);
        if complete {
            match self.journal.remove_segment(&name) {
                Ok(()) => tracing::debug!(segment = %name, "journal segment drained"),
                Err(e) => tracing::warn!(segment = %name, error = %e, "failed to remove drained segment"),
            }
        }
    }

    /// Deliver a batch to the destination group routed for `key`
    ///
    /// Addresses in the group are tried in order; the first success wins.
    async fn deliver(&self, key: &str, batch: &[Bytes]) -> io::Result<u64> {
        let Some(table) = self.table.load_full() else {
            return Err(io::Error::new(
                ErrorKind::NotConnected,
                "no routing table applied",
            ));
        };
        let Some(handle) = table.resolve(key) else {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("no route for key {key}"),
            ));
        };

        let mut last_err = io::Error::new(ErrorKind::NotFound, "destination group is empty");
        for addr in handle.addrs() {
            match self.deliver_to(addr, batch).await {
                Ok(written) => return Ok(written),
                Err(e) => {
                    tracing::debug!(addr = %addr, error = %e, "destination attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn deliver_to(&self, addr: &str, batch: &[Bytes]) -> io::Result<u64> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(ErrorKind::TimedOut, "connect timed out"))??;
        let mut stream = stream;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(addr = %addr, error = %e, "failed to set TCP_NODELAY");
        }

        let written = timeout(self.config.write_timeout, async {
            let mut written = 0u64;
            for payload in batch {
                stream.write_all(payload).await?;
                stream.write_all(b"\n").await?;
                written += payload.len() as u64 + 1;
            }
            stream.shutdown().await?;
            Ok::<u64, io::Error>(written)
        })
        .await
        .map_err(|_| io::Error::new(ErrorKind::TimedOut, "write timed out"))??;

        Ok(written)
    }
}

impl RouteConsumer for SenderLayer {
    fn name(&self) -> &str {
        "sender"
    }

    fn apply_routing_table(&self, table: &Arc<RoutingTable>) {
        self.table.store(Some(Arc::clone(table)));
        tracing::debug!(consumer = "sender", routes = table.len(), "routing table applied");
    }
}

impl std::fmt::Debug for SenderLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderLayer")
            .field("send_interval", &self.config.send_interval)
            .field("max_send_bytes", &self.config.max_send_bytes)
            .finish()
    }
}
