//! Process health samples

use serde::Serialize;

/// Health record assembled fresh on every heartbeat tick
///
/// Carries the process identity (build, commit), the identity of the
/// currently active routing config, and resource usage. Reported to the
/// telemetry sink and discarded; nothing retains samples across ticks.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessHealthSample {
    /// Human-readable build description (version, os/arch)
    pub build_info: String,
    /// VCS commit the binary was built from, `unknown` outside CI
    pub commit_id: String,
    /// `loaded_at_unix` of the active config snapshot, `0` before the
    /// first successful load
    pub config_loaded_at_unix: i64,
    /// Fingerprint of the active config snapshot, empty before the first
    /// successful load
    pub config_fingerprint: String,
    /// Resident set size in bytes
    pub resident_memory_bytes: u64,
    /// User CPU seconds consumed per wall second since the previous tick
    pub user_cpu_fraction: f64,
    /// System CPU seconds consumed per wall second since the previous tick
    pub system_cpu_fraction: f64,
}

/// CPU fraction over a wall-clock window
///
/// Both deltas are seconds. The fraction can exceed `1.0` on multi-core
/// hosts. A non-positive wall delta reports `0` rather than dividing by
/// zero; this covers the first tick (no previous sample) and wall-clock
/// anomalies.
pub fn cpu_fraction(cpu_delta_secs: f64, wall_delta_secs: f64) -> f64 {
    if wall_delta_secs <= 0.0 {
        0.0
    } else {
        cpu_delta_secs / wall_delta_secs
    }
}
