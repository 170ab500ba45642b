//! One-shot status endpoint
//!
//! Listens on `SHUNT_DEBUG_ADDR` and answers every connection with a
//! single JSON document, then closes. There is no protocol and no
//! routing: `nc host port` is the whole client.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use shunt_lifecycle::{BuildInfo, ConfigPublisher};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Serves the status document on the debug address
pub struct StatusServer {
    listener: TcpListener,
    publisher: Arc<ConfigPublisher>,
    build: BuildInfo,
    started: Instant,
}

impl StatusServer {
    /// Bind the status listener
    pub async fn bind(
        addr: &str,
        publisher: Arc<ConfigPublisher>,
        build: BuildInfo,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            publisher,
            build,
            started: Instant::now(),
        })
    }

    /// The address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Answer connections until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let address = self.local_addr().map(|a| a.to_string()).unwrap_or_default();
        tracing::info!(%address, "status endpoint listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => self.answer(stream).await,
                    Err(e) => {
                        tracing::debug!(error = %e, "status accept error");
                    }
                },
            }
        }

        tracing::info!(%address, "status endpoint stopped");
    }

    /// Write the document and close; the document fits in the socket
    /// buffer, so a slow client cannot stall the loop.
    async fn answer(&self, mut stream: TcpStream) {
        let mut body = self.document().to_string();
        body.push('\n');
        if let Err(e) = stream.write_all(body.as_bytes()).await {
            tracing::debug!(error = %e, "status write failed");
            return;
        }
        let _ = stream.shutdown().await;
    }

    fn document(&self) -> serde_json::Value {
        let (fingerprint, loaded_at) =
            self.publisher.active().map_or((String::new(), 0), |snapshot| {
                (
                    snapshot.fingerprint().to_string(),
                    snapshot.loaded_at_unix(),
                )
            });
        serde_json::json!({
            "build": self.build.build_info,
            "commit": self.build.commit_id,
            "config_fingerprint": fingerprint,
            "config_loaded_at": loaded_at,
            "uptime_secs": self.started.elapsed().as_secs(),
        })
    }
}
