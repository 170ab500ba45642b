//! TCP ingestion listener
//!
//! Accepts connections and reads line-protocol records, forwarding each
//! accepted [`Record`] into the ingest channel. One task per connection;
//! the accept loop and every handler stop on cancellation.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use shunt_delivery::Record;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::line::{LineRead, parse_record, read_bounded_line};
use crate::{IngestError, IngestMetrics};

/// Default bound on a single line, delimiter included
pub const DEFAULT_MAX_LINE_BYTES: usize = 1 << 20;

/// TCP listener configuration
#[derive(Debug, Clone)]
pub struct TcpIngestConfig {
    /// Bind address (`host:port`)
    pub bind_addr: String,
    /// Reject lines longer than this
    pub max_line_bytes: usize,
}

impl Default for TcpIngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl TcpIngestConfig {
    /// Config bound to an explicit address
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Default::default()
        }
    }
}

/// Line-protocol TCP listener
pub struct TcpIngest {
    listener: TcpListener,
    records: mpsc::Sender<Record>,
    max_line_bytes: usize,
    metrics: Arc<IngestMetrics>,
}

impl TcpIngest {
    /// Bind the listener
    ///
    /// Binding is separate from [`run`](Self::run) so the caller can
    /// learn the bound address (port `0` in tests) and fail fast when
    /// the address is taken.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Bind`] when the address cannot be bound.
    pub async fn bind(
        config: TcpIngestConfig,
        records: mpsc::Sender<Record>,
    ) -> Result<Self, IngestError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| IngestError::bind(&config.bind_addr, e))?;
        Ok(Self {
            listener,
            records,
            max_line_bytes: config.max_line_bytes,
            metrics: Arc::new(IngestMetrics::new()),
        })
    }

    /// The address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Listener counters
    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Accept connections until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let address = self.local_addr().map(|a| a.to_string()).unwrap_or_default();
        tracing::info!(%address, "tcp ingest listening");

        let ingest = Arc::new(self);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = ingest.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        ingest.metrics.connection_opened();
                        let ingest = Arc::clone(&ingest);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ingest.handle_connection(stream, peer, cancel).await {
                                if !is_disconnect(&e) {
                                    tracing::debug!(peer = %peer, error = %e, "connection error");
                                }
                            }
                            ingest.metrics.connection_closed();
                        });
                    }
                    Err(e) => {
                        // Transient; keep accepting.
                        tracing::warn!(error = %e, "accept error");
                    }
                },
            }
        }

        tracing::info!(%address, "tcp ingest stopped");
    }

    /// Read records off one connection until EOF or cancellation
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) -> io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::with_capacity(1024);

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = read_bounded_line(&mut reader, &mut line, self.max_line_bytes) => read?,
            };

            match read {
                LineRead::Eof => return Ok(()),
                LineRead::TooLong => {
                    self.metrics.record_rejected();
                    tracing::debug!(
                        peer = %peer,
                        max = self.max_line_bytes,
                        "line too long, dropped"
                    );
                }
                LineRead::Line(wire_bytes) => {
                    if line.is_empty() {
                        continue;
                    }
                    let Some(record) = parse_record(&line) else {
                        self.metrics.record_rejected();
                        tracing::debug!(peer = %peer, "malformed line, dropped");
                        continue;
                    };
                    if self.records.send(record).await.is_err() {
                        // Pipeline shut down under us.
                        tracing::debug!(peer = %peer, "ingest channel closed");
                        return Ok(());
                    }
                    self.metrics.record_accepted(wire_bytes as u64);
                }
            }
        }
    }
}

impl std::fmt::Debug for TcpIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpIngest")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("max_line_bytes", &self.max_line_bytes)
            .finish_non_exhaustive()
    }
}

/// Peer-went-away errors not worth logging
pub(crate) fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
