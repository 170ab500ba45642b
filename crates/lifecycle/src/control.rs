//! Signal-driven control events
//!
//! OS signals are translated into [`ControlEvent`]s on a small channel at
//! the edge of the process; everything downstream consumes events and
//! never touches signal plumbing, so the dispatch path is testable by
//! posting synthetic events.
//!
//! Signal mapping (unix):
//!
//! | Signal            | Event                    |
//! |-------------------|--------------------------|
//! | SIGHUP            | [`ControlEvent::Reload`]   |
//! | SIGUSR1, SIGUSR2  | [`ControlEvent::Reload`]   |
//! | SIGTERM, SIGINT   | [`ControlEvent::Shutdown`] |
//!
//! A reload event triggers two independent actions: a config reload and a
//! log rotation. Each one logs its own outcome; a failure of one never
//! skips the other.

use std::io;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{ConfigPublisher, LogRotationError, LogSink};
use shunt_routing::ConfigSource;

/// Control events that drive the service's main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Reload configuration and rotate the log file
    Reload,
    /// Begin graceful shutdown
    Shutdown,
}

/// Capacity of the control channel
///
/// Signals arriving faster than the dispatch loop drains them coalesce
/// against this bound; dropping an extra reload burst is harmless.
pub const CONTROL_CHANNEL_SIZE: usize = 8;

/// Create the control channel
pub fn control_channel() -> (mpsc::Sender<ControlEvent>, mpsc::Receiver<ControlEvent>) {
    mpsc::channel(CONTROL_CHANNEL_SIZE)
}

/// Install signal handlers and forward them as control events
///
/// Handler installation happens before the listener task is spawned, so
/// a platform refusing signal registration surfaces at startup instead
/// of as a silently deaf process.
///
/// # Errors
///
/// Returns the OS error when a signal handler cannot be installed.
#[cfg(unix)]
pub fn spawn_signal_listener(tx: mpsc::Sender<ControlEvent>) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut user2 = signal(SignalKind::user_defined2())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(()) = hangup.recv() => {
                    tracing::info!(signal = "SIGHUP", "control signal received");
                    ControlEvent::Reload
                }
                Some(()) = user1.recv() => {
                    tracing::info!(signal = "SIGUSR1", "control signal received");
                    ControlEvent::Reload
                }
                Some(()) = user2.recv() => {
                    tracing::info!(signal = "SIGUSR2", "control signal received");
                    ControlEvent::Reload
                }
                Some(()) = terminate.recv() => {
                    tracing::info!(signal = "SIGTERM", "control signal received");
                    ControlEvent::Shutdown
                }
                Some(()) = interrupt.recv() => {
                    tracing::info!(signal = "SIGINT", "control signal received");
                    ControlEvent::Shutdown
                }
                else => break,
            };

            if tx.send(event).await.is_err() {
                // Dispatch loop is gone, nothing left to control.
                break;
            }
        }
    }))
}

/// Install signal handlers and forward them as control events
///
/// Non-unix platforms only get ctrl-c, mapped to shutdown.
#[cfg(not(unix))]
pub fn spawn_signal_listener(tx: mpsc::Sender<ControlEvent>) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            if tx.send(ControlEvent::Shutdown).await.is_err() {
                break;
            }
        }
    }))
}

/// Consume control events until a shutdown event (or channel close)
///
/// The caller runs its shutdown sequence after this returns.
pub async fn run_dispatch(
    mut events: mpsc::Receiver<ControlEvent>,
    publisher: &ConfigPublisher,
    source: &ConfigSource,
    log: &LogSink,
) {
    tracing::info!("control dispatch running");
    while let Some(event) = events.recv().await {
        match event {
            ControlEvent::Reload => {
                reload_config(publisher, source);
                rotate_logs(log);
            }
            ControlEvent::Shutdown => {
                tracing::info!("shutdown event received");
                return;
            }
        }
    }
    tracing::info!("control channel closed");
}

/// Reload the routing configuration, keeping the old snapshot on failure
pub fn reload_config(publisher: &ConfigPublisher, source: &ConfigSource) {
    if let Err(e) = publisher.reload(source) {
        tracing::warn!(error = %e, "reload failed, keeping previous configuration");
    }
}

/// Rotate the log file, keeping the old sink on failure
pub fn rotate_logs(log: &LogSink) {
    match log.rotate() {
        Ok(()) => tracing::info!(path = ?log.path(), "log file rotated"),
        Err(LogRotationError::NoLogFile) => {
            tracing::debug!("no log file configured, rotation skipped");
        }
        Err(e) => tracing::warn!(error = %e, "log rotation failed, keeping previous sink"),
    }
}
