//! Settings error types

use thiserror::Error;

/// Result type for settings operations
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors that can occur while reading or validating environment settings
///
/// Unlike routing config errors these are startup-fatal: a process that
/// cannot make sense of its environment should not begin serving.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Environment variable holds a value that does not parse
    #[error("invalid value for {var}: {message}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// What was wrong with the value
        message: String,
    },

    /// Neither a destination host list nor a config path is set
    #[error("no routing source: SHUNT_DESTINATIONS is empty and SHUNT_CONFIG_PATH is unset")]
    NoRoutingSource,
}

impl SettingsError {
    /// Create an InvalidValue error
    pub fn invalid_value(var: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            var,
            message: message.into(),
        }
    }
}
