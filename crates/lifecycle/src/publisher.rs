//! Config publisher
//!
//! Owns the active [`ConfigSnapshot`] and performs the hot swap that every
//! reload goes through. A publish has three strictly ordered steps:
//!
//! 1. **Fan out**: hand the new routing table to every registered
//!    [`RouteConsumer`] in registration order (buffering, then durable,
//!    then sender).
//! 2. **Retire**: release each destination handle of the outgoing table
//!    that the new table does not carry over. A handle is carried over
//!    only when the same match key points at the very same handle.
//! 3. **Swap**: store the new snapshot for lock-free readers.
//!
//! Step 2 never starts before step 1 finishes, so a consumer always holds
//! a live table. Loads are serialized by a mutex; readers go through
//! [`ConfigPublisher::active`] and never contend with a reload in flight.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use shunt_routing::{ConfigError, ConfigSnapshot, ConfigSource, RouteConsumer, RoutingTable};

/// Owns and atomically replaces the active config snapshot
pub struct ConfigPublisher {
    /// The active snapshot; readers load this lock-free
    active: ArcSwapOption<ConfigSnapshot>,
    /// Consumers in fan-out order, fixed at startup
    consumers: Vec<Arc<dyn RouteConsumer>>,
    /// Serializes load and reload; never taken on the read path
    reload_guard: Mutex<()>,
}

impl ConfigPublisher {
    /// Create a publisher over a fixed consumer list
    ///
    /// Fan-out happens in the order given here.
    pub fn new(consumers: Vec<Arc<dyn RouteConsumer>>) -> Self {
        Self {
            active: ArcSwapOption::const_empty(),
            consumers,
            reload_guard: Mutex::new(()),
        }
    }

    /// The currently active snapshot, if any load has succeeded
    ///
    /// Lock-free; safe to call from the heartbeat and status paths while
    /// a reload is in flight.
    pub fn active(&self) -> Option<Arc<ConfigSnapshot>> {
        self.active.load_full()
    }

    /// Perform the initial load
    ///
    /// # Errors
    ///
    /// Returns the parse or read error unchanged; nothing is published
    /// and no consumer is touched on failure.
    pub fn load(&self, source: &ConfigSource) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let snapshot = self.publish(source)?;
        tracing::info!(
            source = %source.describe(),
            fingerprint = snapshot.fingerprint(),
            routes = snapshot.table().len(),
            "configuration loaded"
        );
        Ok(snapshot)
    }

    /// Replace the active snapshot with a freshly parsed one
    ///
    /// # Errors
    ///
    /// On failure the previously active snapshot stays in place, no
    /// consumer sees a new table and no handle is released.
    pub fn reload(&self, source: &ConfigSource) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let started = Instant::now();
        let snapshot = self.publish(source)?;
        tracing::info!(
            source = %source.describe(),
            fingerprint = snapshot.fingerprint(),
            routes = snapshot.table().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "configuration reloaded"
        );
        Ok(snapshot)
    }

    /// Parse, fan out, retire, swap
    fn publish(&self, source: &ConfigSource) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let _guard = self.reload_guard.lock();

        let mut candidate = source.parse()?;
        let previous = self.active.load_full();

        let table = Arc::clone(candidate.table());
        for consumer in &self.consumers {
            consumer.apply_routing_table(&table);
            tracing::trace!(consumer = consumer.name(), "routing table applied");
        }

        if let Some(ref previous) = previous {
            // Every consumer now resolves through the new table; handles
            // the new table does not carry over can go.
            let released = retire_replaced(previous.table(), &table);
            if released > 0 {
                tracing::debug!(released, "destination handles retired");
            }
            candidate.raise_loaded_at(previous.loaded_at_unix());
        }

        let snapshot = Arc::new(candidate);
        self.active.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }
}

impl std::fmt::Debug for ConfigPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.consumers.iter().map(|c| c.name()).collect();
        f.debug_struct("ConfigPublisher")
            .field("consumers", &names)
            .field("loaded", &self.active.load().is_some())
            .finish_non_exhaustive()
    }
}

/// Release handles of `old` that `new` does not carry over
///
/// A handle survives only when the same key maps to the same handle
/// (pointer identity, not address-list equality). Returns the number of
/// handles this call released.
pub(crate) fn retire_replaced(old: &RoutingTable, new: &RoutingTable) -> usize {
    let mut released = 0;
    for (key, handle) in old.iter() {
        let carried = new.get(key).is_some_and(|next| Arc::ptr_eq(next, handle));
        if !carried && handle.release() {
            tracing::trace!(key, "destination handle released");
            released += 1;
        }
    }
    released
}
