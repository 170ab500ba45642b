//! Destination handles
//!
//! A `DestinationHandle` is the per-destination resource a routing table
//! entry points at: the group of addresses a stream is delivered to, plus
//! the single teardown capability used when the table that owns the handle
//! is retired.

use std::sync::atomic::{AtomicBool, Ordering};

/// Per-destination resource with an at-most-once release
///
/// Exactly one routing table owns a handle at any time. Retirement of a
/// superseded table is the only path that calls [`release`](Self::release);
/// the atomic flag makes a second call a no-op so a handle can never be
/// torn down twice.
#[derive(Debug)]
pub struct DestinationHandle {
    /// Destination address group (`host:port` each)
    addrs: Vec<String>,
    released: AtomicBool,
}

impl DestinationHandle {
    /// Create a handle over an address group
    pub fn new(addrs: Vec<String>) -> Self {
        Self {
            addrs,
            released: AtomicBool::new(false),
        }
    }

    /// Create a handle over a single address
    pub fn single(addr: impl Into<String>) -> Self {
        Self::new(vec![addr.into()])
    }

    /// All addresses in the group
    #[inline]
    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    /// First address of the group, if any
    #[inline]
    pub fn primary(&self) -> Option<&str> {
        self.addrs.first().map(String::as_str)
    }

    /// Release the handle
    ///
    /// Returns `true` if this call performed the release, `false` if the
    /// handle was already released earlier.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    /// Whether the handle has been released
    #[inline]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_handle_is_live() {
        let handle = DestinationHandle::single("127.0.0.1:9009");
        assert!(!handle.is_released());
        assert_eq!(handle.primary(), Some("127.0.0.1:9009"));
    }

    #[test]
    fn test_release_is_at_most_once() {
        let handle = DestinationHandle::single("127.0.0.1:9009");

        assert!(handle.release());
        assert!(handle.is_released());

        // Second call reports that the release already happened.
        assert!(!handle.release());
        assert!(handle.is_released());
    }

    #[test]
    fn test_address_group() {
        let handle =
            DestinationHandle::new(vec!["10.0.0.1:9009".into(), "10.0.0.2:9009".into()]);
        assert_eq!(handle.addrs().len(), 2);
        assert_eq!(handle.primary(), Some("10.0.0.1:9009"));
    }

    #[test]
    fn test_empty_group_has_no_primary() {
        let handle = DestinationHandle::new(Vec::new());
        assert_eq!(handle.primary(), None);
        assert!(handle.addrs().is_empty());
    }
}
