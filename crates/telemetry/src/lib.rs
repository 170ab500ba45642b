//! Shunt telemetry - process health sampling and the heartbeat sink seam.
//!
//! The heartbeat loop builds a [`ProcessHealthSample`] each tick and hands
//! it to whatever implements [`TelemetrySink`] (in the shipped wiring, the
//! journal layer). Key principles:
//!
//! - **Non-blocking**: sampling reads kernel counters, never the network
//! - **Best-effort**: sink failures are logged by the caller and dropped,
//!   a heartbeat must never take the service down
//! - **Lock-free reads**: config identity comes from the atomically
//!   published snapshot, not from the reload path's guard
//!
//! # Usage
//!
//! ```
//! use shunt_telemetry::{cpu_fraction, cpu_times, resident_memory_bytes};
//!
//! let cpu = cpu_times().unwrap();
//! let rss = resident_memory_bytes().unwrap();
//!
//! // Fractions are cpu-delta over wall-delta; a zero window reports 0.
//! assert_eq!(cpu_fraction(1.0, 0.0), 0.0);
//! let _ = (cpu, rss);
//! ```

mod rusage;
mod sample;
mod sink;

pub use rusage::{CpuTimes, cpu_times, resident_memory_bytes};
pub use sample::{ProcessHealthSample, cpu_fraction};
pub use sink::{Result, TelemetrySink, TelemetrySinkError};
