//! Route consumer trait
//!
//! Each subsystem that routes traffic (buffering, durable, sender layers)
//! registers itself with the publisher once at startup. On every
//! successful load the publisher calls `apply_routing_table` on each
//! consumer, in registration order, and waits for all of them before any
//! handle of the outgoing table is released.

use std::sync::Arc;

use crate::RoutingTable;

/// A subsystem that adopts each newly published routing table
///
/// `apply_routing_table` must not fail: malformed configurations are
/// rejected by the config source before publication, so any table a
/// consumer sees is well-formed. Implementations swap an internal
/// reference and return; slow work here delays every reload.
pub trait RouteConsumer: Send + Sync {
    /// Consumer name used in publish logs
    fn name(&self) -> &str;

    /// Adopt a newly published routing table
    fn apply_routing_table(&self, table: &Arc<RoutingTable>);
}
