//! Process resource sampling
//!
//! Thin wrappers over `getrusage(2)` and `/proc/self/statm`. On platforms
//! without these interfaces the functions report zeros so the heartbeat
//! keeps working with degraded detail.

use std::io;
use std::time::Duration;

/// Cumulative CPU time of this process, split user/system
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    /// Time spent executing user code
    pub user: Duration,
    /// Time spent in the kernel on this process's behalf
    pub system: Duration,
}

/// Sample cumulative CPU times for the current process
#[cfg(unix)]
pub fn cpu_times() -> io::Result<CpuTimes> {
    let usage = getrusage_self()?;
    Ok(CpuTimes {
        user: timeval_duration(usage.ru_utime),
        system: timeval_duration(usage.ru_stime),
    })
}

/// Sample cumulative CPU times for the current process
///
/// Always zero on platforms without `getrusage`.
#[cfg(not(unix))]
pub fn cpu_times() -> io::Result<CpuTimes> {
    Ok(CpuTimes::default())
}

/// Resident set size of the current process in bytes
///
/// Prefers the live value from `/proc/self/statm`; falls back to the
/// kernel's high-water mark when procfs is unavailable.
#[cfg(unix)]
pub fn resident_memory_bytes() -> io::Result<u64> {
    #[cfg(target_os = "linux")]
    if let Ok(bytes) = statm_resident_bytes() {
        return Ok(bytes);
    }

    max_resident_bytes()
}

/// Resident set size of the current process in bytes
///
/// Always zero on platforms without `getrusage`.
#[cfg(not(unix))]
pub fn resident_memory_bytes() -> io::Result<u64> {
    Ok(0)
}

#[cfg(unix)]
fn getrusage_self() -> io::Result<libc::rusage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: RUSAGE_SELF is a valid target and the pointer is to a
    // properly sized, writable rusage struct.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: getrusage returned 0, the struct is initialized.
    Ok(unsafe { usage.assume_init() })
}

#[cfg(unix)]
fn timeval_duration(tv: libc::timeval) -> Duration {
    let secs = tv.tv_sec.max(0) as u64;
    let nanos = (tv.tv_usec.max(0) as u64).min(999_999) * 1_000;
    Duration::new(secs, nanos as u32)
}

#[cfg(unix)]
fn max_resident_bytes() -> io::Result<u64> {
    let usage = getrusage_self()?;
    // ru_maxrss is bytes on macOS, kilobytes elsewhere.
    #[cfg(target_os = "macos")]
    let bytes = usage.ru_maxrss.max(0) as u64;
    #[cfg(not(target_os = "macos"))]
    let bytes = usage.ru_maxrss.max(0) as u64 * 1024;
    Ok(bytes)
}

#[cfg(target_os = "linux")]
fn statm_resident_bytes() -> io::Result<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm")?;
    let pages: u64 = statm
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| io::Error::other("malformed /proc/self/statm"))?;
    Ok(pages * page_size())
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_times_are_cumulative() {
        let first = cpu_times().unwrap();

        // Burn a little CPU so the counters have a chance to move.
        let mut acc = 0u64;
        for i in 0..2_000_000u64 {
            acc = acc.wrapping_add(i);
        }
        std::hint::black_box(acc);

        let second = cpu_times().unwrap();
        assert!(second.user >= first.user);
        assert!(second.system >= first.system);
    }

    #[test]
    fn test_resident_memory_is_nonzero() {
        let rss = resident_memory_bytes().unwrap();
        assert!(rss > 0, "a running process has resident pages");
    }
}
