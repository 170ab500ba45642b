//! Shunt lifecycle - config hot swap and process orchestration.
//!
//! Everything that makes the proxy a long-lived process lives here: the
//! publisher that owns the active routing config and swaps it without a
//! restart, the signal-driven control loop, the hourly heartbeat, the
//! one-shot descriptor limit raise, log rotation and the graceful
//! shutdown sequence.
//!
//! # Architecture
//!
//! ```text
//!   signals ──▶ ControlEvent channel ──▶ dispatch ──┬─▶ ConfigPublisher::reload
//!                                                   └─▶ LogSink::rotate
//!
//!   ConfigPublisher ── fan out ──▶ RouteConsumers (buffer, journal, sender)
//!                  └── retire ──▶ replaced DestinationHandles
//!
//!   shutdown event ──▶ ShutdownCoordinator ──▶ cancel token
//!                                          └─▶ DurableState flush (bounded)
//! ```
//!
//! Reads of the active config ([`ConfigPublisher::active`]) are lock-free
//! and safe from any task; loads and reloads serialize on an internal
//! guard.

mod control;
mod error;
mod heartbeat;
mod logging;
mod publisher;
mod rlimit;
mod shutdown;

pub use control::{
    CONTROL_CHANNEL_SIZE, ControlEvent, control_channel, reload_config, rotate_logs, run_dispatch,
    spawn_signal_listener,
};
pub use error::{LogRotationError, ResourceLimitError, ShutdownFlushError};
pub use heartbeat::{BuildInfo, DEFAULT_HEARTBEAT_INTERVAL, HeartbeatReporter};
pub use logging::{LogSink, LogWriter};
pub use publisher::ConfigPublisher;
pub use rlimit::{RlimitChange, open_file_limits, raise_open_file_limit};
pub use shutdown::{DEFAULT_FLUSH_TIMEOUT, DurableState, ShutdownCoordinator};

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod publisher_test;
