//! Shutdown coordination
//!
//! One coordinator owns the graceful exit: it cancels the shared token so
//! every loop stops accepting work, then gives the durable layer a bounded
//! window to persist its acknowledgment bookkeeping. Repeated shutdown
//! triggers (a second SIGTERM while the first is still flushing) are
//! absorbed; the flush runs exactly once and the process exits no matter
//! how the flush went.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ShutdownFlushError;

/// Default ceiling on the durable flush at shutdown
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// State that must be persisted before the process exits
///
/// Implemented by the journal layer, which snapshots per-segment
/// acknowledged offsets so a restart resumes replay where delivery left
/// off instead of re-sending whole segments.
pub trait DurableState: Send + Sync {
    /// Persist acknowledgment bookkeeping; returns the entry count written
    fn flush_acknowledged_offsets(&self) -> io::Result<usize>;
}

/// Runs the graceful exit sequence exactly once
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    durable: Arc<dyn DurableState>,
    flush_timeout: Duration,
    begun: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create a coordinator over the shared cancellation token
    pub fn new(cancel: CancellationToken, durable: Arc<dyn DurableState>) -> Self {
        Self {
            cancel,
            durable,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            begun: AtomicBool::new(false),
        }
    }

    /// Override the flush ceiling
    #[must_use]
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Whether shutdown has already been triggered
    #[inline]
    pub fn has_begun(&self) -> bool {
        self.begun.load(Ordering::Acquire)
    }

    /// Run the shutdown sequence
    ///
    /// The first caller cancels the token, flushes durable state within
    /// the configured timeout and returns `true`. Every later call
    /// returns `false` without doing anything, so stacked termination
    /// signals cannot flush twice. Flush failures are logged and do not
    /// block the exit.
    pub async fn run(&self) -> bool {
        if self.begun.swap(true, Ordering::AcqRel) {
            tracing::debug!("shutdown already in progress, ignoring trigger");
            return false;
        }

        tracing::info!(
            flush_timeout_ms = self.flush_timeout.as_millis() as u64,
            "shutdown starting"
        );
        self.cancel.cancel();

        let durable = Arc::clone(&self.durable);
        let flush = tokio::task::spawn_blocking(move || durable.flush_acknowledged_offsets());

        match tokio::time::timeout(self.flush_timeout, flush).await {
            Ok(Ok(Ok(entries))) => {
                tracing::info!(entries, "acknowledged offsets flushed");
            }
            Ok(Ok(Err(e))) => {
                let err = ShutdownFlushError::flush(e);
                tracing::warn!(error = %err, "exiting without a clean flush");
            }
            Ok(Err(join_err)) => {
                let err = ShutdownFlushError::task(join_err.to_string());
                tracing::warn!(error = %err, "exiting without a clean flush");
            }
            Err(_) => {
                let err = ShutdownFlushError::timed_out(self.flush_timeout);
                tracing::warn!(error = %err, "exiting without a clean flush");
            }
        }

        tracing::info!("shutdown complete");
        true
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("flush_timeout", &self.flush_timeout)
            .field("begun", &self.has_begun())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct CountingDurable {
        flushes: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    impl CountingDurable {
        fn new() -> Self {
            Self {
                flushes: AtomicUsize::new(0),
                fail: false,
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }

        fn flush_count(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    impl DurableState for CountingDurable {
        fn flush_acknowledged_offsets(&self) -> io::Result<usize> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.flushes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(io::Error::other("disk on fire"));
            }
            Ok(3)
        }
    }

    #[tokio::test]
    async fn test_run_cancels_and_flushes() {
        let cancel = CancellationToken::new();
        let durable = Arc::new(CountingDurable::new());
        let coordinator = ShutdownCoordinator::new(cancel.clone(), Arc::clone(&durable) as _);

        assert!(coordinator.run().await);
        assert!(cancel.is_cancelled());
        assert_eq!(durable.flush_count(), 1);
        assert!(coordinator.has_begun());
    }

    #[tokio::test]
    async fn test_second_trigger_is_ignored() {
        let durable = Arc::new(CountingDurable::new());
        let coordinator =
            ShutdownCoordinator::new(CancellationToken::new(), Arc::clone(&durable) as _);

        assert!(coordinator.run().await);
        assert!(!coordinator.run().await);
        assert_eq!(durable.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_stacked_triggers_flush_once() {
        let durable = Arc::new(CountingDurable::new());
        let coordinator = Arc::new(ShutdownCoordinator::new(
            CancellationToken::new(),
            Arc::clone(&durable) as _,
        ));

        let (first, second) = tokio::join!(coordinator.run(), coordinator.run());
        assert_ne!(first, second, "exactly one trigger performs the shutdown");
        assert_eq!(durable.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_flush_failure_still_completes() {
        let durable = Arc::new(CountingDurable::failing());
        let coordinator =
            ShutdownCoordinator::new(CancellationToken::new(), Arc::clone(&durable) as _);

        assert!(coordinator.run().await);
        assert_eq!(durable.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_flush_timeout_does_not_block_exit() {
        let durable = Arc::new(CountingDurable::slow(Duration::from_millis(300)));
        let coordinator =
            ShutdownCoordinator::new(CancellationToken::new(), Arc::clone(&durable) as _)
                .with_flush_timeout(Duration::from_millis(10));

        let started = std::time::Instant::now();
        assert!(coordinator.run().await);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
