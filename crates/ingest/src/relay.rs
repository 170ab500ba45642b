//! TCP relay
//!
//! Byte-for-byte proxy used when shunt fronts a destination without
//! parsing traffic. Each accepted connection is spliced to the wildcard
//! destination of the current routing table; addresses in the group are
//! tried in order until one connects. The server adopts new tables as a
//! [`RouteConsumer`], so a reload redirects the next connection without
//! touching established ones.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use std::{fmt, io};

use arc_swap::ArcSwapOption;
use shunt_routing::{DestinationHandle, RouteConsumer, RoutingTable};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::IngestError;
use crate::tcp::is_disconnect;

/// Default bound on a single upstream connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address (`host:port`)
    pub bind_addr: String,
    /// Per-address upstream connect timeout
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Config bound to an explicit address
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Default::default()
        }
    }
}

/// Relay counters
#[derive(Debug)]
pub struct RelayMetrics {
    /// Connections currently spliced
    pub connections_active: AtomicU64,
    /// Connections accepted since start
    pub connections_total: AtomicU64,
    /// Upstream connect attempts that failed or timed out
    pub connect_failures: AtomicU64,
    /// Bytes copied client to upstream
    pub bytes_upstream: AtomicU64,
    /// Bytes copied upstream to client
    pub bytes_downstream: AtomicU64,
}

impl RelayMetrics {
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            bytes_upstream: AtomicU64::new(0),
            bytes_downstream: AtomicU64::new(0),
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
    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transfer(&self, upstream: u64, downstream: u64) {
        self.bytes_upstream.fetch_add(upstream, Ordering::Relaxed);
        self.bytes_downstream.fetch_add(downstream, Ordering::Relaxed);
    }

    /// Point-in-time view of the counters
    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            bytes_upstream: self.bytes_upstream.load(Ordering::Relaxed),
            bytes_downstream: self.bytes_downstream.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of [`RelayMetrics`] at one instant
#[derive(Debug, Clone, Copy)]
pub struct RelaySnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub connect_failures: u64,
    pub bytes_upstream: u64,
    pub bytes_downstream: u64,
}

/// Pass-through TCP proxy to the wildcard destination
pub struct RelayServer {
    listener: TcpListener,
    table: ArcSwapOption<RoutingTable>,
    connect_timeout: Duration,
    metrics: Arc<RelayMetrics>,
}

impl RelayServer {
    /// Bind the listener
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Bind`] when the address cannot be bound.
    pub async fn bind(config: RelayConfig) -> Result<Self, IngestError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| IngestError::bind(&config.bind_addr, e))?;
        Ok(Self {
            listener,
            table: ArcSwapOption::empty(),
            connect_timeout: config.connect_timeout,
            metrics: Arc::new(RelayMetrics::new()),
        })
    }

    /// The address the listener is bound to
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Relay counters
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Accept and splice connections until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let address = self.local_addr().map(|a| a.to_string()).unwrap_or_default();
        tracing::info!(%address, "relay listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.metrics.connection_opened();
                        let relay = Arc::clone(&self);
                        tokio::spawn(async move {
                            relay.splice(stream, peer).await;
                            relay.metrics.connection_closed();
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept error");
                    }
                },
            }
        }

        tracing::info!(%address, "relay stopped");
    }

    /// Proxy one connection to the wildcard destination
    async fn splice(&self, mut inbound: TcpStream, peer: std::net::SocketAddr) {
        let Some(table) = self.table.load_full() else {
            // No configuration published yet.
            tracing::debug!(peer = %peer, "relay has no routing table, closing");
            return;
        };
        let Some(upstream) = table.wildcard().cloned() else {
            tracing::debug!(peer = %peer, "routing table has no wildcard destination, closing");
            return;
        };
        drop(table);

        let Some(mut outbound) = self.connect(&upstream).await else {
            tracing::debug!(peer = %peer, "no upstream reachable, closing");
            return;
        };

        match tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
            Ok((to_upstream, to_client)) => {
                self.metrics.record_transfer(to_upstream, to_client);
                tracing::debug!(
                    peer = %peer,
                    to_upstream,
                    to_client,
                    "relay connection closed"
                );
            }
            Err(e) if is_disconnect(&e) => {}
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "relay connection error");
            }
        }
    }

    /// Try each address of the group in order
    async fn connect(&self, upstream: &DestinationHandle) -> Option<TcpStream> {
        for addr in upstream.addrs() {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Some(stream),
                Ok(Err(e)) => {
                    self.metrics.connect_failed();
                    tracing::debug!(addr = %addr, error = %e, "upstream connect failed");
                }
                Err(_) => {
                    self.metrics.connect_failed();
                    tracing::debug!(
                        addr = %addr,
                        timeout_ms = self.connect_timeout.as_millis() as u64,
                        "upstream connect timed out"
                    );
                }
            }
        }
        None
    }
}

impl RouteConsumer for RelayServer {
    fn name(&self) -> &str {
        "relay"
    }

    fn apply_routing_table(&self, table: &Arc<RoutingTable>) {
        self.table.store(Some(Arc::clone(table)));
        tracing::debug!(routes = table.len(), "relay adopted routing table");
    }
}

impl fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
