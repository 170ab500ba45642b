//! Command implementations for the shunt CLI

use std::time::Duration;

pub mod relay;
pub mod serve;

/// Per-task drain window once shutdown begins
pub(crate) const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
