//! Listener metrics
//!
//! Shared by the TCP and UDP listeners. For UDP there are no
//! connections, so the connection counters stay at zero.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for an ingestion listener
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Records parsed and forwarded into the ingest channel
    pub records_accepted: AtomicU64,
    /// Lines rejected: malformed, oversized, or with an invalid key
    pub records_rejected: AtomicU64,
    /// Wire bytes of accepted records, delimiters included
    pub bytes_received: AtomicU64,
}

impl IngestMetrics {
    /// Create a zeroed metrics instance
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            records_accepted: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_accepted(&self, bytes: u64) {
        self.records_accepted.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of listener counters
#[derive(Debug, Clone, Copy)]
pub struct IngestSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub bytes_received: u64,
}
