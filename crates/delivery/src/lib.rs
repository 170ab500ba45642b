//! Shunt - Delivery
//!
//! The three consumer layers that move accepted payloads to their
//! destinations:
//!
//! - [`BufferLayer`] keeps per-key bounded in-memory queues fed by the
//!   ingest channel.
//! - [`JournalLayer`] owns the on-disk spool: rotated write-ahead segments
//!   plus the acknowledged-offset snapshot the shutdown path flushes.
//! - [`SenderLayer`] drains the buffer, writes batches to the routed
//!   destination over TCP, journals what it cannot deliver, and replays
//!   journaled segments as destinations recover.
//!
//! All three implement `RouteConsumer`, so a configuration reload swaps
//! their routing tables atomically through the publisher fan-out:
//!
//! ```text
//! [Ingest] --Record--> [BufferLayer] --drain--> [SenderLayer] --TCP--> [Destination]
//!                                                    |  failure
//!                                                    v
//!                                              [JournalLayer] --replay--> [SenderLayer]
//! ```

mod buffer;
mod journal;
mod record;
mod sender;

pub use buffer::{BufferLayer, BufferMetrics, BufferSnapshot};
pub use journal::{
    INTERNAL_KEY, JournalConfig, JournalEntry, JournalLayer, JournalMetrics, JournalSnapshot,
    SegmentReader,
};
pub use record::Record;
pub use sender::{SenderConfig, SenderLayer, SenderMetrics, SenderSnapshot};

// Re-export the consumer contract for convenience
pub use shunt_routing::{RouteConsumer, RoutingTable};

/// Default capacity of the ingest-to-buffer channel
pub const DEFAULT_INGEST_CHANNEL_SIZE: usize = 10_000;
