//! Tests for RoutingTable
//!
//! Tests cover exact/wildcard resolution, handle access, and edge cases.

use std::sync::Arc;

use crate::{DestinationHandle, RoutingTable, WILDCARD_KEY};

fn handle(addr: &str) -> Arc<DestinationHandle> {
    Arc::new(DestinationHandle::single(addr))
}

// =============================================================================
// Basic table tests
// =============================================================================

#[test]
fn test_new_table_is_empty() {
    let table = RoutingTable::new();
    assert!(table.is_empty());
    assert_eq!(table.len(), 0);
    assert!(table.wildcard().is_none());
}

#[test]
fn test_with_capacity() {
    let table = RoutingTable::with_capacity(10);
    assert!(table.is_empty());
}

#[test]
fn test_default_is_empty() {
    let table = RoutingTable::default();
    assert!(table.is_empty());
}

#[test]
fn test_insert_and_get() {
    let mut table = RoutingTable::new();
    table.insert("events", handle("10.0.0.1:9009"));

    assert_eq!(table.len(), 1);
    assert!(table.contains_key("events"));
    assert_eq!(
        table.get("events").unwrap().primary(),
        Some("10.0.0.1:9009")
    );
    assert!(table.get("logs").is_none());
}

#[test]
fn test_insert_replaces_and_returns_previous() {
    let mut table = RoutingTable::new();
    table.insert("events", handle("10.0.0.1:9009"));

    let previous = table.insert("events", handle("10.0.0.2:9009"));

    assert_eq!(previous.unwrap().primary(), Some("10.0.0.1:9009"));
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get("events").unwrap().primary(),
        Some("10.0.0.2:9009")
    );
}

// =============================================================================
// Resolution tests
// =============================================================================

#[test]
fn test_resolve_exact_key() {
    let mut table = RoutingTable::new();
    table.insert("events", handle("10.0.0.1:9009"));

    assert_eq!(
        table.resolve("events").unwrap().primary(),
        Some("10.0.0.1:9009")
    );
}

#[test]
fn test_resolve_falls_back_to_wildcard() {
    let mut table = RoutingTable::new();
    table.insert("events", handle("10.0.0.1:9009"));
    table.insert(WILDCARD_KEY, handle("10.0.0.9:9009"));

    // Exact match wins.
    assert_eq!(
        table.resolve("events").unwrap().primary(),
        Some("10.0.0.1:9009")
    );

    // Unknown keys land on the wildcard route.
    assert_eq!(
        table.resolve("logs").unwrap().primary(),
        Some("10.0.0.9:9009")
    );
    assert_eq!(
        table.resolve("metrics").unwrap().primary(),
        Some("10.0.0.9:9009")
    );
}

#[test]
fn test_resolve_without_wildcard_returns_none() {
    let mut table = RoutingTable::new();
    table.insert("events", handle("10.0.0.1:9009"));

    assert!(table.resolve("logs").is_none());
}

#[test]
fn test_wildcard_accessor() {
    let mut table = RoutingTable::new();
    table.insert(WILDCARD_KEY, handle("10.0.0.9:9009"));

    assert_eq!(table.wildcard().unwrap().primary(), Some("10.0.0.9:9009"));
}

// =============================================================================
// Iteration tests
// =============================================================================

#[test]
fn test_iter_routes() {
    let mut table = RoutingTable::new();
    table.insert("events", handle("10.0.0.1:9009"));
    table.insert("logs", handle("10.0.0.2:9009"));

    let routes: Vec<_> = table.iter().collect();
    assert_eq!(routes.len(), 2);

    // HashMap iteration order is unspecified; check membership.
    assert!(routes.iter().any(|(k, _)| *k == "events"));
    assert!(routes.iter().any(|(k, _)| *k == "logs"));
}

#[test]
fn test_keys() {
    let mut table = RoutingTable::new();
    table.insert("events", handle("10.0.0.1:9009"));
    table.insert("logs", handle("10.0.0.2:9009"));

    let mut keys: Vec<_> = table.keys().collect();
    keys.sort_unstable();
    assert_eq!(keys, ["events", "logs"]);
}

// =============================================================================
// Handle sharing tests
// =============================================================================

#[test]
fn test_resolved_handles_share_identity() {
    let mut table = RoutingTable::new();
    let h = handle("10.0.0.1:9009");
    table.insert("events", Arc::clone(&h));

    let resolved = table.resolve("events").unwrap();
    assert!(Arc::ptr_eq(resolved, &h));
}

#[test]
fn test_release_through_table_is_visible_everywhere() {
    let mut table = RoutingTable::new();
    let h = handle("10.0.0.1:9009");
    table.insert("events", Arc::clone(&h));

    assert!(table.get("events").unwrap().release());
    assert!(h.is_released());
}
