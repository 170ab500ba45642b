//! Telemetry sink seam

use thiserror::Error;

use crate::ProcessHealthSample;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, TelemetrySinkError>;

/// Errors a telemetry sink can report
///
/// The heartbeat loop logs these and drops the sample; no sink error
/// propagates further.
#[derive(Debug, Error)]
pub enum TelemetrySinkError {
    /// Writing the record to the sink's backing store failed
    #[error("failed to write health record: {source}")]
    Write {
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Encoding the record failed
    #[error("failed to encode health record: {source}")]
    Encode {
        /// Underlying encoding error
        #[source]
        source: serde_json::Error,
    },

    /// The sink is not accepting records right now
    #[error("telemetry sink unavailable: {reason}")]
    Unavailable {
        /// Why the sink refused the record
        reason: String,
    },
}

impl TelemetrySinkError {
    /// Create a Write error
    #[inline]
    pub fn write(source: std::io::Error) -> Self {
        Self::Write { source }
    }

    /// Create an Encode error
    #[inline]
    pub fn encode(source: serde_json::Error) -> Self {
        Self::Encode { source }
    }

    /// Create an Unavailable error
    #[inline]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Durable destination for heartbeat records
pub trait TelemetrySink: Send + Sync {
    /// Persist one health sample
    ///
    /// # Errors
    ///
    /// Implementations surface write/encode failures; callers log and
    /// continue.
    fn report(&self, sample: &ProcessHealthSample) -> Result<()>;
}
