//! Shunt - Routing
//!
//! Routing tables, config snapshots and the config source parser.
//!
//! # Design
//!
//! A `RoutingTable` maps match keys (logical stream names) to destination
//! handles and is immutable once constructed: a reload never mutates the
//! live table, it builds a brand-new one from the config source and hands
//! it to the publisher for an atomic swap. Destination handles carry the
//! at-most-once `release()` used when a superseded table is retired.
//!
//! Consumers of routing state implement [`RouteConsumer`] and adopt each
//! newly published table before the previous one is retired.
//!
//! # Example
//!
//! ```
//! use shunt_routing::ConfigSource;
//!
//! let source = ConfigSource::host_list(vec!["127.0.0.1:9009".into()]);
//! let snapshot = source.parse().unwrap();
//!
//! // The host-list form synthesizes a single wildcard route.
//! let handle = snapshot.table().resolve("events").unwrap();
//! assert_eq!(handle.addrs(), ["127.0.0.1:9009"]);
//! ```

mod consumer;
mod error;
mod handle;
mod snapshot;
mod source;
mod table;

#[cfg(test)]
mod source_test;
#[cfg(test)]
mod table_test;

pub use consumer::RouteConsumer;
pub use error::{ConfigError, Result};
pub use handle::DestinationHandle;
pub use snapshot::ConfigSnapshot;
pub use source::{ConfigSource, fingerprint, parse_routing_text};
pub use table::{RoutingTable, WILDCARD_KEY};
