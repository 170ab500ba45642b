//! UDP ingestion listener
//!
//! Each datagram carries one or more newline-separated records in the
//! same line protocol the TCP listener speaks. There is no connection
//! state; malformed lines are counted and dropped.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use shunt_delivery::Record;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::line::parse_record;
use crate::{IngestError, IngestMetrics};

/// Default datagram receive buffer
pub const DEFAULT_MAX_DATAGRAM_BYTES: usize = 64 * 1024;

/// UDP listener configuration
#[derive(Debug, Clone)]
pub struct UdpIngestConfig {
    /// Bind address (`host:port`)
    pub bind_addr: String,
    /// Receive buffer size; longer datagrams are truncated by the OS
    pub max_datagram_bytes: usize,
}

impl Default for UdpIngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            max_datagram_bytes: DEFAULT_MAX_DATAGRAM_BYTES,
        }
    }
}

impl UdpIngestConfig {
    /// Config bound to an explicit address
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Default::default()
        }
    }
}

/// Line-protocol UDP listener
pub struct UdpIngest {
    socket: UdpSocket,
    records: mpsc::Sender<Record>,
    max_datagram_bytes: usize,
    metrics: Arc<IngestMetrics>,
}

impl UdpIngest {
    /// Bind the socket
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Bind`] when the address cannot be bound.
    pub async fn bind(
        config: UdpIngestConfig,
        records: mpsc::Sender<Record>,
    ) -> Result<Self, IngestError> {
        let socket = UdpSocket::bind(&config.bind_addr)
            .await
            .map_err(|e| IngestError::bind(&config.bind_addr, e))?;
        Ok(Self {
            socket,
            records,
            max_datagram_bytes: config.max_datagram_bytes,
            metrics: Arc::new(IngestMetrics::new()),
        })
    }

    /// The address the socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Listener counters
    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Receive datagrams until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let address = self.local_addr().map(|a| a.to_string()).unwrap_or_default();
        tracing::info!(%address, "udp ingest listening");

        let mut buf = vec![0u8; self.max_datagram_bytes];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        if !self.handle_datagram(&buf[..len], peer).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "udp receive error");
                    }
                },
            }
        }

        tracing::info!(%address, "udp ingest stopped");
    }

    /// Split one datagram into records; false once the channel is gone
    async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) -> bool {
        for line in datagram.split(|&b| b == b'\n') {
            let line = match line.last() {
                Some(b'\r') => &line[..line.len() - 1],
                _ => line,
            };
            if line.is_empty() {
                continue;
            }
            let Some(record) = parse_record(line) else {
                self.metrics.record_rejected();
                tracing::debug!(peer = %peer, "malformed datagram line, dropped");
                continue;
            };
            let wire_bytes = line.len() as u64 + 1;
            if self.records.send(record).await.is_err() {
                tracing::debug!(peer = %peer, "ingest channel closed");
                return false;
            }
            self.metrics.record_accepted(wire_bytes);
        }
        true
    }
}

impl std::fmt::Debug for UdpIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpIngest")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("max_datagram_bytes", &self.max_datagram_bytes)
            .finish_non_exhaustive()
    }
}
