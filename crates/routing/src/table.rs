//! Routing table for match-key → destination lookup
//!
//! The table is built once per config load and never mutated afterwards.
//! The hot path resolves a match key to a destination handle with a single
//! HashMap lookup plus a wildcard fallback.

use std::collections::HashMap;
use std::sync::Arc;

use crate::DestinationHandle;

/// Match key of the wildcard route consulted when no exact key matches
pub const WILDCARD_KEY: &str = "*";

/// Immutable mapping from match keys to destination handles
///
/// A reload never touches the live table: the config source builds a
/// brand-new `RoutingTable` and the publisher swaps it in atomically.
/// Handles are held behind `Arc` so consumers that adopted the table can
/// keep resolving through it while a successor is being published.
///
/// The table deliberately does not implement `Clone`: a handle belongs to
/// exactly one table, and cloning would duplicate ownership of the
/// teardown capability.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use shunt_routing::{DestinationHandle, RoutingTable};
///
/// let mut table = RoutingTable::new();
/// table.insert("events", Arc::new(DestinationHandle::single("10.0.0.1:9009")));
/// table.insert("*", Arc::new(DestinationHandle::single("10.0.0.9:9009")));
///
/// // Exact key wins over the wildcard.
/// assert_eq!(
///     table.resolve("events").unwrap().primary(),
///     Some("10.0.0.1:9009")
/// );
/// assert_eq!(
///     table.resolve("logs").unwrap().primary(),
///     Some("10.0.0.9:9009")
/// );
/// ```
#[derive(Debug)]
pub struct RoutingTable {
    /// Routes: match key → destination handle
    routes: HashMap<String, Arc<DestinationHandle>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// Create a new empty routing table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Create a routing table with pre-allocated capacity
    #[inline]
    #[must_use]
    pub fn with_capacity(routes: usize) -> Self {
        Self {
            routes: HashMap::with_capacity(routes),
        }
    }

    /// Insert a route
    ///
    /// Only used while a table is being built from a config source or in
    /// tests; a published table is never mutated. Returns the previously
    /// mapped handle if the key was already present.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        handle: Arc<DestinationHandle>,
    ) -> Option<Arc<DestinationHandle>> {
        self.routes.insert(key.into(), handle)
    }

    /// Look up the handle mapped to an exact match key
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Arc<DestinationHandle>> {
        self.routes.get(key)
    }

    /// Resolve a match key to its destination
    ///
    /// Exact key first, then the `*` wildcard route. Returns `None` only
    /// when neither exists, in which case the caller drops (and counts)
    /// the record.
    #[inline]
    pub fn resolve(&self, key: &str) -> Option<&Arc<DestinationHandle>> {
        self.routes.get(key).or_else(|| self.routes.get(WILDCARD_KEY))
    }

    /// The wildcard route, if configured
    #[inline]
    pub fn wildcard(&self) -> Option<&Arc<DestinationHandle>> {
        self.routes.get(WILDCARD_KEY)
    }

    /// Check whether an exact match key is present
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.routes.contains_key(key)
    }

    /// Number of routes (wildcard included)
    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table has no routes at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate over all routes
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<DestinationHandle>)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over all match keys
    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}
