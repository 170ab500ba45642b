//! Shunt - Ingest
//!
//! Network listeners that accept records and feed them into the delivery
//! pipeline, plus the pass-through relay.
//!
//! # Listeners
//!
//! - **TCP** - line protocol, one `<key>\t<payload>` record per line
//! - **UDP** - same protocol, one or more lines per datagram
//! - **Relay** - byte-for-byte proxy to the wildcard destination
//!
//! The TCP and UDP listeners parse; the relay never does. Each listener
//! binds separately from running so callers can bind port `0` and read
//! the assigned address back.
//!
//! # Example
//!
//! ```ignore
//! use shunt_ingest::{TcpIngest, TcpIngestConfig};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let (tx, rx) = mpsc::channel(1000);
//! let listener = TcpIngest::bind(TcpIngestConfig::new("0.0.0.0:8080"), tx).await?;
//! listener.run(CancellationToken::new()).await;
//! ```

pub mod relay;
pub mod tcp;
pub mod udp;

mod error;
mod line;
mod metrics;

pub use error::IngestError;
pub use metrics::{IngestMetrics, IngestSnapshot};
pub use relay::{RelayConfig, RelayMetrics, RelayServer, RelaySnapshot};
pub use tcp::{TcpIngest, TcpIngestConfig};
pub use udp::{UdpIngest, UdpIngestConfig};

// Re-exported so callers can build channels without importing the
// delivery crate directly.
pub use shunt_delivery::Record;

// Test modules
#[cfg(test)]
mod relay_test;
