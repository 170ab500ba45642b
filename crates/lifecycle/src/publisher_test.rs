use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use shunt_routing::{
    ConfigSource, DestinationHandle, RouteConsumer, RoutingTable, fingerprint,
};
use tempfile::TempDir;

use crate::ConfigPublisher;
use crate::publisher::retire_replaced;

type SharedLog = Arc<Mutex<Vec<String>>>;

/// Consumer that appends its applies to a log shared across consumers
struct RecordingConsumer {
    name: &'static str,
    log: SharedLog,
}

impl RouteConsumer for RecordingConsumer {
    fn name(&self) -> &str {
        self.name
    }

    fn apply_routing_table(&self, table: &Arc<RoutingTable>) {
        self.log.lock().push(format!("{}:{}", self.name, table.len()));
    }
}

fn recording(name: &'static str, log: &SharedLog) -> Arc<dyn RouteConsumer> {
    Arc::new(RecordingConsumer {
        name,
        log: Arc::clone(log),
    })
}

/// Consumer that checks, while fan-out is running, whether a watched
/// handle from the outgoing table has already been released
#[derive(Default)]
struct ReleaseProbe {
    watched: Mutex<Option<Arc<DestinationHandle>>>,
    saw_release_during_apply: AtomicBool,
}

impl ReleaseProbe {
    fn watch(&self, handle: Arc<DestinationHandle>) {
        *self.watched.lock() = Some(handle);
    }

    fn saw_release_during_apply(&self) -> bool {
        self.saw_release_during_apply.load(Ordering::SeqCst)
    }
}

impl RouteConsumer for ReleaseProbe {
    fn name(&self) -> &str {
        "probe"
    }

    fn apply_routing_table(&self, _table: &Arc<RoutingTable>) {
        let watched = self.watched.lock();
        if let Some(handle) = watched.as_ref() {
            if handle.is_released() {
                self.saw_release_during_apply.store(true, Ordering::SeqCst);
            }
        }
    }
}

fn write_config(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path
}

// ============================================================================
// Load
// ============================================================================

#[test]
fn test_load_fans_out_in_registration_order() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "routes.conf", "events 10.0.0.1:9009\n");

    let log = Arc::new(Mutex::new(Vec::new()));
    let publisher = ConfigPublisher::new(vec![
        recording("buffering", &log),
        recording("durable", &log),
        recording("sender", &log),
    ]);

    publisher.load(&ConfigSource::file(&path)).unwrap();

    assert_eq!(*log.lock(), vec!["buffering:1", "durable:1", "sender:1"]);
}

#[test]
fn test_load_stamps_fingerprint_and_time() {
    let text = "events 10.0.0.1:9009\n";
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "routes.conf", text);

    let publisher = ConfigPublisher::new(Vec::new());
    publisher.load(&ConfigSource::file(&path)).unwrap();

    let snapshot = publisher.active().unwrap();
    assert_eq!(snapshot.fingerprint(), fingerprint(text));
    assert!(snapshot.loaded_at_unix() > 0);
}

#[test]
fn test_load_failure_publishes_nothing() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let publisher = ConfigPublisher::new(vec![recording("buffering", &log)]);

    let missing = ConfigSource::file("/nonexistent/shunt/routes.conf");
    assert!(publisher.load(&missing).is_err());

    assert!(publisher.active().is_none());
    assert!(log.lock().is_empty(), "no fan-out for a failed load");
}

// ============================================================================
// Reload
// ============================================================================

#[test]
fn test_reload_swaps_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "routes.conf", "events 10.0.0.1:9009\n");
    let source = ConfigSource::file(&path);

    let publisher = ConfigPublisher::new(Vec::new());
    let first = publisher.load(&source).unwrap();

    std::fs::write(&path, "events 10.0.0.2:9009\nlogs 10.0.0.3:9009\n").unwrap();
    let second = publisher.reload(&source).unwrap();

    assert_ne!(first.fingerprint(), second.fingerprint());

    let active = publisher.active().unwrap();
    assert!(Arc::ptr_eq(&active, &second));
    assert_eq!(active.table().len(), 2);
    assert_eq!(
        active.table().resolve("events").unwrap().primary(),
        Some("10.0.0.2:9009")
    );
}

#[test]
fn test_failed_reload_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "routes.conf", "events 10.0.0.1:9009\n");
    let source = ConfigSource::file(&path);

    let log = Arc::new(Mutex::new(Vec::new()));
    let publisher = ConfigPublisher::new(vec![recording("buffering", &log)]);

    let first = publisher.load(&source).unwrap();
    let old_handle = first.table().get("events").cloned().unwrap();

    // Second token missing, the parse is rejected.
    std::fs::write(&path, "events\n").unwrap();
    assert!(publisher.reload(&source).is_err());

    let active = publisher.active().unwrap();
    assert!(
        Arc::ptr_eq(&active, &first),
        "snapshot unchanged after a failed reload"
    );
    assert!(!old_handle.is_released());
    assert_eq!(log.lock().len(), 1, "no fan-out for a rejected config");
}

#[test]
fn test_loaded_at_never_decreases_across_reloads() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "routes.conf", "events 10.0.0.1:9009\n");
    let source = ConfigSource::file(&path);

    let publisher = ConfigPublisher::new(Vec::new());
    let first = publisher.load(&source).unwrap();
    let second = publisher.reload(&source).unwrap();

    assert!(second.loaded_at_unix() >= first.loaded_at_unix());
}

// ============================================================================
// Handle retirement
// ============================================================================

#[test]
fn test_reload_releases_only_replaced_handles() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "routes.conf", "events 10.0.0.1:9009\n");
    let source = ConfigSource::file(&path);

    let publisher = ConfigPublisher::new(Vec::new());
    let first = publisher.load(&source).unwrap();
    let retired = first.table().get("events").cloned().unwrap();

    // events moves to a new destination and logs appears fresh.
    std::fs::write(&path, "events 10.0.0.2:9009\nlogs 10.0.0.3:9009\n").unwrap();
    publisher.reload(&source).unwrap();

    assert!(retired.is_released());
    assert!(!retired.release(), "the reload already released it");

    let active = publisher.active().unwrap();
    assert!(!active.table().get("events").unwrap().is_released());
    assert!(!active.table().get("logs").unwrap().is_released());
}

#[test]
fn test_fanout_completes_before_retirement() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "routes.conf", "events 10.0.0.1:9009\n");
    let source = ConfigSource::file(&path);

    let probe = Arc::new(ReleaseProbe::default());
    let publisher = ConfigPublisher::new(vec![Arc::clone(&probe) as Arc<dyn RouteConsumer>]);

    let first = publisher.load(&source).unwrap();
    let watched = first.table().get("events").cloned().unwrap();
    probe.watch(Arc::clone(&watched));

    std::fs::write(&path, "events 10.0.0.2:9009\n").unwrap();
    publisher.reload(&source).unwrap();

    assert!(
        !probe.saw_release_during_apply(),
        "outgoing handles must stay live until every consumer has the new table"
    );
    assert!(watched.is_released(), "and are retired once fan-out is done");
}

#[test]
fn test_retire_spares_handles_carried_by_identity() {
    let kept = Arc::new(DestinationHandle::single("10.0.0.1:9009"));
    let replaced = Arc::new(DestinationHandle::single("10.0.0.2:9009"));

    let mut old = RoutingTable::new();
    old.insert("events", Arc::clone(&kept));
    old.insert("logs", Arc::clone(&replaced));

    let mut new = RoutingTable::new();
    new.insert("events", Arc::clone(&kept));
    new.insert("logs", Arc::new(DestinationHandle::single("10.0.0.3:9009")));

    assert_eq!(retire_replaced(&old, &new), 1);
    assert!(!kept.is_released());
    assert!(replaced.is_released());
}

#[test]
fn test_retire_releases_dropped_keys() {
    let dropped = Arc::new(DestinationHandle::single("10.0.0.1:9009"));
    let mut old = RoutingTable::new();
    old.insert("events", Arc::clone(&dropped));

    assert_eq!(retire_replaced(&old, &RoutingTable::new()), 1);
    assert!(dropped.is_released());
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn test_concurrent_reloads_serialize() {
    let text_a = "events 10.0.0.1:9009\n";
    let text_b = "events 10.0.0.2:9009\n";

    let dir = TempDir::new().unwrap();
    let path_a = write_config(&dir, "a.conf", text_a);
    let path_b = write_config(&dir, "b.conf", text_b);

    let log = Arc::new(Mutex::new(Vec::new()));
    let publisher = ConfigPublisher::new(vec![recording("buffering", &log)]);
    publisher.load(&ConfigSource::file(&path_a)).unwrap();

    let publisher = &publisher;
    std::thread::scope(|scope| {
        for source in [ConfigSource::file(&path_a), ConfigSource::file(&path_b)] {
            scope.spawn(move || {
                for _ in 0..5 {
                    publisher.reload(&source).unwrap();
                }
            });
        }
    });

    // Initial load plus ten reloads, each fanning out exactly once.
    assert_eq!(log.lock().len(), 11);

    let active_fp = publisher.active().unwrap().fingerprint().to_string();
    assert!(active_fp == fingerprint(text_a) || active_fp == fingerprint(text_b));
}
