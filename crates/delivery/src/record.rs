//! Keyed payload record

use bytes::Bytes;

/// One keyed payload travelling from ingest to delivery
///
/// The key selects the destination through the routing table; the payload
/// is opaque to every layer in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Destination match key
    pub key: String,

    /// Opaque payload bytes
    pub payload: Bytes,
}

impl Record {
    /// Create a record from a key and payload
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }

    /// Payload length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when the payload is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new() {
        let record = Record::new("events", "hello");
        assert_eq!(record.key, "events");
        assert_eq!(record.payload, Bytes::from("hello"));
        assert_eq!(record.len(), 5);
        assert!(!record.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let record = Record::new("events", Bytes::new());
        assert!(record.is_empty());
        assert_eq!(record.len(), 0);
    }
}
