use std::io;

use thiserror::Error;

/// Errors surfaced by the ingest listeners
#[derive(Debug, Error)]
pub enum IngestError {
    /// Listener socket could not be bound
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested
        address: String,
        /// Underlying bind failure
        #[source]
        source: io::Error,
    },

    /// I/O failure outside of bind
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl IngestError {
    pub(crate) fn bind(address: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_the_address() {
        let e = IngestError::bind(
            "0.0.0.0:8080",
            io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        );
        let text = e.to_string();
        assert!(text.contains("0.0.0.0:8080"), "got: {text}");
        assert!(text.contains("address in use"), "got: {text}");
    }
}
