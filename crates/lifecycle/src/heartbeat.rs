//! Periodic process health reporting
//!
//! Once per interval (an hour by default) the reporter samples process
//! CPU and memory, stamps the sample with build identity and the active
//! config's fingerprint, and hands it to a [`TelemetrySink`]. Config
//! metadata is read from the lock-free snapshot so a heartbeat never
//! contends with a reload. Sink failures are logged and dropped; the
//! heartbeat must never take the service down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shunt_telemetry::{
    CpuTimes, ProcessHealthSample, TelemetrySink, cpu_fraction, cpu_times, resident_memory_bytes,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ConfigPublisher;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3600);

/// Build identity stamped into every health sample
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Human-readable build line, e.g. `shunt 0.3.1 (linux/x86_64)`
    pub build_info: String,
    /// Short VCS commit id, `unknown` for untagged builds
    pub commit_id: String,
}

impl BuildInfo {
    /// Create build identity
    pub fn new(build_info: impl Into<String>, commit_id: impl Into<String>) -> Self {
        Self {
            build_info: build_info.into(),
            commit_id: commit_id.into(),
        }
    }
}

/// Emits one [`ProcessHealthSample`] per interval until cancelled
pub struct HeartbeatReporter {
    publisher: Arc<ConfigPublisher>,
    sink: Arc<dyn TelemetrySink>,
    build: BuildInfo,
    interval: Duration,
}

impl HeartbeatReporter {
    /// Create a reporter feeding `sink`
    pub fn new(
        publisher: Arc<ConfigPublisher>,
        sink: Arc<dyn TelemetrySink>,
        build: BuildInfo,
    ) -> Self {
        Self {
            publisher,
            sink,
            build,
            interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override the heartbeat period
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the heartbeat loop until the token is cancelled
    ///
    /// The first tick fires immediately and reports zero CPU fractions,
    /// since there is no earlier sample to diff against.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "heartbeat reporter starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut previous: Option<(CpuTimes, Instant)> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(&mut previous),
            }
        }

        tracing::info!("heartbeat reporter stopping");
    }

    /// Sample, assemble and report one heartbeat
    pub(crate) fn tick(&self, previous: &mut Option<(CpuTimes, Instant)>) {
        let now = Instant::now();
        let cpu = match cpu_times() {
            Ok(cpu) => cpu,
            Err(e) => {
                tracing::warn!(error = %e, "cpu sampling failed, skipping heartbeat");
                return;
            }
        };

        let (user_fraction, system_fraction) = match *previous {
            Some((prev_cpu, prev_at)) => {
                let wall = now.duration_since(prev_at).as_secs_f64();
                (
                    cpu_fraction(cpu.user.as_secs_f64() - prev_cpu.user.as_secs_f64(), wall),
                    cpu_fraction(
                        cpu.system.as_secs_f64() - prev_cpu.system.as_secs_f64(),
                        wall,
                    ),
                )
            }
            None => (0.0, 0.0),
        };
        *previous = Some((cpu, now));

        let resident_memory_bytes = match resident_memory_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "memory sampling failed, reporting zero");
                0
            }
        };

        // Before the first successful load there is no config identity.
        let (config_loaded_at_unix, config_fingerprint) = self
            .publisher
            .active()
            .map_or((0, String::new()), |snapshot| {
                (
                    snapshot.loaded_at_unix(),
                    snapshot.fingerprint().to_string(),
                )
            });

        let sample = ProcessHealthSample {
            build_info: self.build.build_info.clone(),
            commit_id: self.build.commit_id.clone(),
            config_loaded_at_unix,
            config_fingerprint,
            resident_memory_bytes,
            user_cpu_fraction: user_fraction,
            system_cpu_fraction: system_fraction,
        };

        match self.sink.report(&sample) {
            Ok(()) => tracing::debug!(
                resident_memory_bytes = sample.resident_memory_bytes,
                user_cpu = sample.user_cpu_fraction,
                system_cpu = sample.system_cpu_fraction,
                "heartbeat reported"
            ),
            Err(e) => tracing::warn!(error = %e, "heartbeat sink rejected sample"),
        }
    }
}

impl std::fmt::Debug for HeartbeatReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatReporter")
            .field("interval", &self.interval)
            .field("build", &self.build)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use shunt_routing::ConfigSource;
    use shunt_telemetry::TelemetrySinkError;
    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct CapturingSink {
        samples: Mutex<Vec<ProcessHealthSample>>,
        fail: bool,
    }

    impl TelemetrySink for CapturingSink {
        fn report(&self, sample: &ProcessHealthSample) -> shunt_telemetry::Result<()> {
            if self.fail {
                return Err(TelemetrySinkError::unavailable("sink offline"));
            }
            self.samples.lock().push(sample.clone());
            Ok(())
        }
    }

    fn reporter_with(
        publisher: Arc<ConfigPublisher>,
        sink: Arc<CapturingSink>,
    ) -> HeartbeatReporter {
        HeartbeatReporter::new(
            publisher,
            sink as Arc<dyn TelemetrySink>,
            BuildInfo::new("shunt 0.3.1 (linux/x86_64)", "abcdef0"),
        )
    }

    #[test]
    fn test_first_tick_reports_zero_fractions() {
        let sink = Arc::new(CapturingSink::default());
        let reporter = reporter_with(Arc::new(ConfigPublisher::new(Vec::new())), Arc::clone(&sink));

        let mut previous = None;
        reporter.tick(&mut previous);

        let samples = sink.samples.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].user_cpu_fraction, 0.0);
        assert_eq!(samples[0].system_cpu_fraction, 0.0);
        assert_eq!(samples[0].build_info, "shunt 0.3.1 (linux/x86_64)");
        assert!(previous.is_some(), "baseline recorded for the next tick");
    }

    #[test]
    fn test_unloaded_config_reports_empty_identity() {
        let sink = Arc::new(CapturingSink::default());
        let reporter = reporter_with(Arc::new(ConfigPublisher::new(Vec::new())), Arc::clone(&sink));

        reporter.tick(&mut None);

        let samples = sink.samples.lock();
        assert_eq!(samples[0].config_loaded_at_unix, 0);
        assert_eq!(samples[0].config_fingerprint, "");
    }

    #[test]
    fn test_active_config_identity_flows_into_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.conf");
        std::fs::write(&path, "events 10.0.0.1:9009\n").unwrap();

        let publisher = Arc::new(ConfigPublisher::new(Vec::new()));
        let snapshot = publisher.load(&ConfigSource::file(&path)).unwrap();

        let sink = Arc::new(CapturingSink::default());
        let reporter = reporter_with(publisher, Arc::clone(&sink));
        reporter.tick(&mut None);

        let samples = sink.samples.lock();
        assert_eq!(samples[0].config_fingerprint, snapshot.fingerprint());
        assert_eq!(samples[0].config_loaded_at_unix, snapshot.loaded_at_unix());
    }

    #[test]
    fn test_later_ticks_report_finite_fractions() {
        let sink = Arc::new(CapturingSink::default());
        let reporter = reporter_with(Arc::new(ConfigPublisher::new(Vec::new())), Arc::clone(&sink));

        let mut previous = None;
        reporter.tick(&mut previous);
        std::thread::sleep(Duration::from_millis(5));
        reporter.tick(&mut previous);

        let samples = sink.samples.lock();
        assert_eq!(samples.len(), 2);
        assert!(samples[1].user_cpu_fraction >= 0.0);
        assert!(samples[1].user_cpu_fraction.is_finite());
        assert!(samples[1].system_cpu_fraction >= 0.0);
    }

    #[test]
    fn test_sink_failure_does_not_panic() {
        let sink = Arc::new(CapturingSink {
            fail: true,
            ..Default::default()
        });
        let reporter = reporter_with(Arc::new(ConfigPublisher::new(Vec::new())), Arc::clone(&sink));

        let mut previous = None;
        reporter.tick(&mut previous);
        reporter.tick(&mut previous);

        assert!(sink.samples.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let sink = Arc::new(CapturingSink::default());
        let reporter = reporter_with(Arc::new(ConfigPublisher::new(Vec::new())), Arc::clone(&sink))
            .with_interval(Duration::from_secs(3600));

        let cancel = CancellationToken::new();
        cancel.cancel();
        reporter.run(cancel).await;
    }
}
