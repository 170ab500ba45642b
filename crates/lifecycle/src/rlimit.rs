//! Open file descriptor ceiling
//!
//! A forwarding proxy holds one descriptor per inbound connection, per
//! outbound destination connection and per journal file; distribution
//! defaults of 1024 run out fast. The tuner runs once at startup, raises
//! `RLIMIT_NOFILE` when the target exceeds the current soft limit, and
//! reports the outcome for logging. A refused raise is never fatal.

use crate::ResourceLimitError;

/// Outcome of a performed raise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlimitChange {
    /// Soft limit before the raise
    pub previous_soft: u64,
    /// Hard limit before the raise
    pub previous_hard: u64,
    /// Ceiling both limits were raised to
    pub target: u64,
}

/// Read the current `RLIMIT_NOFILE` (soft, hard) pair
///
/// # Errors
///
/// Returns [`ResourceLimitError::Read`] when the kernel refuses the
/// query, [`ResourceLimitError::Unsupported`] off unix.
#[cfg(unix)]
pub fn open_file_limits() -> Result<(u64, u64), ResourceLimitError> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: the pointer is to a properly sized, writable rlimit struct.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        return Err(ResourceLimitError::read(std::io::Error::last_os_error()));
    }
    Ok((limit.rlim_cur as u64, limit.rlim_max as u64))
}

/// Read the current `RLIMIT_NOFILE` (soft, hard) pair
#[cfg(not(unix))]
pub fn open_file_limits() -> Result<(u64, u64), ResourceLimitError> {
    Err(ResourceLimitError::Unsupported)
}

/// Raise `RLIMIT_NOFILE` to `target` descriptors
///
/// Returns `Ok(None)` when the current soft limit already meets the
/// target. On a raise, both limits move to the target; the hard limit is
/// never lowered. Raising the hard limit above its current value needs
/// privilege and may be refused.
///
/// # Errors
///
/// Returns [`ResourceLimitError`] for the caller to log; startup
/// continues either way with whatever limit is in effect.
#[cfg(unix)]
pub fn raise_open_file_limit(target: u64) -> Result<Option<RlimitChange>, ResourceLimitError> {
    let (previous_soft, previous_hard) = open_file_limits()?;
    if previous_soft >= target {
        return Ok(None);
    }

    let desired = libc::rlimit {
        rlim_cur: target as libc::rlim_t,
        rlim_max: target.max(previous_hard) as libc::rlim_t,
    };
    // SAFETY: the pointer is to a valid rlimit struct.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &desired) };
    if rc != 0 {
        return Err(ResourceLimitError::raise(
            target,
            std::io::Error::last_os_error(),
        ));
    }

    Ok(Some(RlimitChange {
        previous_soft,
        previous_hard,
        target,
    }))
}

/// Raise `RLIMIT_NOFILE` to `target` descriptors
#[cfg(not(unix))]
pub fn raise_open_file_limit(_target: u64) -> Result<Option<RlimitChange>, ResourceLimitError> {
    Err(ResourceLimitError::Unsupported)
}
