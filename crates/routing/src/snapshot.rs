//! Config snapshots
//!
//! A snapshot bundles a routing table with the identity of the config text
//! it was built from: the load timestamp and a content fingerprint. The
//! publisher holds exactly one snapshot active at a time and replaces it
//! atomically; heartbeat and status reads go through the snapshot so they
//! never observe a half-updated table.

use std::sync::Arc;

use crate::RoutingTable;

/// An immutable, timestamped, fingerprinted routing table instance
#[derive(Debug)]
pub struct ConfigSnapshot {
    table: Arc<RoutingTable>,
    loaded_at_unix: i64,
    fingerprint: String,
}

impl ConfigSnapshot {
    /// Create a snapshot
    pub fn new(table: RoutingTable, loaded_at_unix: i64, fingerprint: impl Into<String>) -> Self {
        Self {
            table: Arc::new(table),
            loaded_at_unix,
            fingerprint: fingerprint.into(),
        }
    }

    /// The routing table this snapshot publishes
    #[inline]
    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// Unix timestamp (seconds) of the load that produced this snapshot
    #[inline]
    pub fn loaded_at_unix(&self) -> i64 {
        self.loaded_at_unix
    }

    /// Hex fingerprint of the config text this snapshot was built from
    #[inline]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Raise the load timestamp to at least `floor`
    ///
    /// The publisher applies the predecessor's timestamp as the floor so
    /// that the active snapshot's `loaded_at_unix` never decreases even if
    /// the wall clock stepped backwards between loads.
    pub fn raise_loaded_at(&mut self, floor: i64) {
        if floor > self.loaded_at_unix {
            self.loaded_at_unix = floor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accessors() {
        let snapshot = ConfigSnapshot::new(RoutingTable::new(), 1_700_000_000, "abcd");
        assert_eq!(snapshot.loaded_at_unix(), 1_700_000_000);
        assert_eq!(snapshot.fingerprint(), "abcd");
        assert!(snapshot.table().is_empty());
    }

    #[test]
    fn test_raise_loaded_at_only_moves_forward() {
        let mut snapshot = ConfigSnapshot::new(RoutingTable::new(), 100, "abcd");

        snapshot.raise_loaded_at(50);
        assert_eq!(snapshot.loaded_at_unix(), 100);

        snapshot.raise_loaded_at(150);
        assert_eq!(snapshot.loaded_at_unix(), 150);
    }
}
