//! Lifecycle error types
//!
//! Everything here is non-fatal: limit tuning, log rotation and the
//! shutdown flush all log their failures and let the process carry on
//! (or exit, in the shutdown case) regardless.

use std::time::Duration;

use thiserror::Error;

/// Errors from raising the open-file-descriptor ceiling
#[derive(Debug, Error)]
pub enum ResourceLimitError {
    /// Current limits could not be read
    #[error("failed to read open file limit: {source}")]
    Read {
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The raise itself was refused
    #[error("failed to raise open file limit to {target}: {source}")]
    Raise {
        /// Requested descriptor ceiling
        target: u64,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Platform has no per-process file descriptor limits
    #[error("open file limits are not supported on this platform")]
    Unsupported,
}

impl ResourceLimitError {
    /// Create a Read error
    #[inline]
    pub fn read(source: std::io::Error) -> Self {
        Self::Read { source }
    }

    /// Create a Raise error
    #[inline]
    pub fn raise(target: u64, source: std::io::Error) -> Self {
        Self::Raise { target, source }
    }
}

/// Errors from the close-and-reopen log rotation
#[derive(Debug, Error)]
pub enum LogRotationError {
    /// Logging goes to stderr, there is no file to rotate
    #[error("no log file configured, nothing to rotate")]
    NoLogFile,

    /// The log path could not be reopened; the previous sink stays active
    #[error("failed to reopen log file '{path}': {source}")]
    Reopen {
        /// Log file path that failed to open
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl LogRotationError {
    /// Create a Reopen error
    #[inline]
    pub fn reopen(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Reopen {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the final durable flush at shutdown
///
/// The coordinator logs these and exits anyway; delivery is at-least-once
/// and a lost offset snapshot only costs replayed records.
#[derive(Debug, Error)]
pub enum ShutdownFlushError {
    /// Flush ran past its deadline
    #[error("durable flush timed out after {}ms", timeout.as_millis())]
    TimedOut {
        /// Configured flush ceiling
        timeout: Duration,
    },

    /// Flush ran but reported an I/O failure
    #[error("durable flush failed: {source}")]
    Flush {
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The blocking flush task itself fell over
    #[error("durable flush task aborted: {reason}")]
    Task {
        /// Join error description
        reason: String,
    },
}

impl ShutdownFlushError {
    /// Create a TimedOut error
    #[inline]
    pub fn timed_out(timeout: Duration) -> Self {
        Self::TimedOut { timeout }
    }

    /// Create a Flush error
    #[inline]
    pub fn flush(source: std::io::Error) -> Self {
        Self::Flush { source }
    }

    /// Create a Task error
    #[inline]
    pub fn task(reason: impl Into<String>) -> Self {
        Self::Task {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_limit_error_display() {
        let err = ResourceLimitError::raise(
            262_144,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "EPERM"),
        );
        assert!(err.to_string().contains("262144"));
        assert!(err.to_string().contains("EPERM"));
    }

    #[test]
    fn test_log_rotation_error_display() {
        let err = LogRotationError::reopen(
            "/var/log/shunt.log",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/var/log/shunt.log"));
    }

    #[test]
    fn test_shutdown_flush_error_display() {
        let err = ShutdownFlushError::timed_out(Duration::from_secs(5));
        assert!(err.to_string().contains("5000ms"));
    }
}
