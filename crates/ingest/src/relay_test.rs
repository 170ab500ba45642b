//! Tests for the relay server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shunt_routing::{DestinationHandle, RouteConsumer, RoutingTable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::relay::{DEFAULT_CONNECT_TIMEOUT, RelayConfig, RelayServer};

// ============================================================================
// Test Helpers
// ============================================================================

fn wildcard_table(addrs: Vec<String>) -> Arc<RoutingTable> {
    let mut table = RoutingTable::new();
    table.insert("*", Arc::new(DestinationHandle::new(addrs)));
    Arc::new(table)
}

/// Backend that accepts one connection, answers every chunk with `reply`,
/// and resolves to the bytes it received once the peer closes.
async fn start_backend(reply: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("backend bind");
    let addr = listener.local_addr().expect("backend addr");
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("backend accept");
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.expect("backend read");
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            stream.write_all(reply).await.expect("backend write");
        }
        received
    });
    (addr, handle)
}

async fn start_relay(table: Option<Arc<RoutingTable>>) -> (Arc<RelayServer>, SocketAddr, CancellationToken) {
    let relay = Arc::new(
        RelayServer::bind(RelayConfig::new("127.0.0.1:0"))
            .await
            .expect("relay bind"),
    );
    if let Some(table) = table {
        relay.apply_routing_table(&table);
    }
    let addr = relay.local_addr().expect("relay addr");
    let cancel = CancellationToken::new();
    tokio::spawn(Arc::clone(&relay).run(cancel.clone()));
    (relay, addr, cancel)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 1s");
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_default_config() {
    let config = RelayConfig::default();
    assert_eq!(config.bind_addr, "0.0.0.0:8080");
    assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
}

#[tokio::test]
async fn test_relay_is_a_route_consumer() {
    let relay = RelayServer::bind(RelayConfig::new("127.0.0.1:0"))
        .await
        .expect("relay bind");
    assert_eq!(relay.name(), "relay");
}

// ============================================================================
// Splice Tests
// ============================================================================

#[tokio::test]
async fn test_splices_both_directions() {
    let (backend_addr, backend) = start_backend(b"pong").await;
    let (relay, addr, cancel) =
        start_relay(Some(wildcard_table(vec![backend_addr.to_string()]))).await;

    let mut client = TcpStream::connect(addr).await.expect("should connect");
    client.write_all(b"ping").await.expect("should write");
    client.shutdown().await.expect("should shut down write half");

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.expect("should read");
    assert_eq!(reply, b"pong");

    let received = backend.await.expect("backend task");
    assert_eq!(received, b"ping");

    // Transfer counters land once the splice completes.
    let metrics = Arc::clone(relay.metrics());
    wait_for(move || {
        let s = metrics.snapshot();
        s.bytes_upstream == 4 && s.bytes_downstream == 4
    })
    .await;

    cancel.cancel();
}

#[tokio::test]
async fn test_unconfigured_relay_closes_connections() {
    let (_relay, addr, cancel) = start_relay(None).await;

    let mut client = TcpStream::connect(addr).await.expect("should connect");
    let mut reply = Vec::new();
    match timeout(Duration::from_secs(1), client.read_to_end(&mut reply)).await {
        Ok(Ok(n)) => assert_eq!(n, 0),
        Ok(Err(_)) => {} // reset also counts as closed
        Err(_) => panic!("connection should be closed promptly"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_table_without_wildcard_closes_connections() {
    let mut table = RoutingTable::new();
    table.insert(
        "events",
        Arc::new(DestinationHandle::single("127.0.0.1:9009")),
    );
    let (_relay, addr, cancel) = start_relay(Some(Arc::new(table))).await;

    let mut client = TcpStream::connect(addr).await.expect("should connect");
    let mut reply = Vec::new();
    match timeout(Duration::from_secs(1), client.read_to_end(&mut reply)).await {
        Ok(Ok(n)) => assert_eq!(n, 0),
        Ok(Err(_)) => {}
        Err(_) => panic!("connection should be closed promptly"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_connect_failover_tries_addresses_in_order() {
    // Grab a port with nothing listening on it.
    let dead = TcpListener::bind("127.0.0.1:0").await.expect("probe bind");
    let dead_addr = dead.local_addr().expect("probe addr").to_string();
    drop(dead);

    let (backend_addr, backend) = start_backend(b"ok").await;
    let (relay, addr, cancel) =
        start_relay(Some(wildcard_table(vec![dead_addr, backend_addr.to_string()]))).await;

    let mut client = TcpStream::connect(addr).await.expect("should connect");
    client.write_all(b"hi").await.expect("should write");
    client.shutdown().await.expect("should shut down write half");

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.expect("should read");
    assert_eq!(reply, b"ok");
    assert_eq!(backend.await.expect("backend task"), b"hi");
    assert_eq!(relay.metrics().snapshot().connect_failures, 1);

    cancel.cancel();
}

// ============================================================================
// Reload Tests
// ============================================================================

#[tokio::test]
async fn test_new_table_redirects_new_connections_only() {
    let (addr_a, backend_a) = start_backend(b"from-a").await;
    let (addr_b, backend_b) = start_backend(b"from-b").await;
    let (relay, addr, cancel) =
        start_relay(Some(wildcard_table(vec![addr_a.to_string()]))).await;

    // Establish a splice to A before the table changes.
    let mut first = TcpStream::connect(addr).await.expect("should connect");
    first.write_all(b"one").await.expect("should write");
    let mut reply = [0u8; 6];
    first.read_exact(&mut reply).await.expect("should read");
    assert_eq!(&reply, b"from-a");

    relay.apply_routing_table(&wildcard_table(vec![addr_b.to_string()]));

    // The established connection stays pinned to A.
    first.write_all(b"two").await.expect("should write");
    first.read_exact(&mut reply).await.expect("should read");
    assert_eq!(&reply, b"from-a");
    first.shutdown().await.expect("should shut down write half");
    drop(first);
    assert_eq!(backend_a.await.expect("backend task"), b"onetwo");

    // A fresh connection lands on B.
    let mut second = TcpStream::connect(addr).await.expect("should connect");
    second.write_all(b"hi").await.expect("should write");
    second.read_exact(&mut reply).await.expect("should read");
    assert_eq!(&reply, b"from-b");
    second.shutdown().await.expect("should shut down write half");
    drop(second);
    assert_eq!(backend_b.await.expect("backend task"), b"hi");

    cancel.cancel();
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_cancel_stops_the_relay() {
    let relay = Arc::new(
        RelayServer::bind(RelayConfig::new("127.0.0.1:0"))
            .await
            .expect("relay bind"),
    );
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&relay).run(cancel.clone()));

    cancel.cancel();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("run should stop after cancel")
        .expect("run task should not panic");
}
