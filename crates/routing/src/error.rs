//! Config source error types

use thiserror::Error;

/// Result type for config source operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while reading or parsing a config source
///
/// All of these are recoverable: a failed load or reload leaves the
/// previously active snapshot (possibly none) in place and is logged.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config source '{path}': {source}")]
    Io {
        /// Path that failed to read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Malformed route line
    #[error("config line {line}: {reason}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        reason: String,
    },

    /// Same match key defined twice
    #[error("duplicate match key '{key}' on config line {line}")]
    DuplicateKey {
        /// The repeated match key
        key: String,
        /// 1-based line number of the second definition
        line: usize,
    },
}

impl ConfigError {
    /// Create an Io error
    #[inline]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a Parse error
    #[inline]
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a DuplicateKey error
    #[inline]
    pub fn duplicate_key(key: impl Into<String>, line: usize) -> Self {
        Self::DuplicateKey {
            key: key.into(),
            line,
        }
    }
}
