//! Durable write-ahead layer
//!
//! `JournalLayer` owns a spool directory. Payloads that could not be
//! delivered (and internal records such as heartbeats) are appended to
//! `current.wal`, which rotates by size or age into timestamped segment
//! files. The sender replays segments and acknowledges how far it got;
//! the acknowledged offsets are snapshotted to `offsets.json` on shutdown
//! and after every completed segment.
//!
//! # File Format
//!
//! Each record is stored as:
//! ```text
//! [2-byte key length][key][4-byte payload length][payload]   (big-endian)
//! ```
//!
//! # Directory Layout
//!
//! ```text
//! {dir}/current.wal                  append target
//! {dir}/segment-{millis}-{seq}.wal   rotated segments, oldest first
//! {dir}/offsets.json                 acknowledged-offset snapshot
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shunt_lifecycle::DurableState;
use shunt_routing::{RouteConsumer, RoutingTable};
use shunt_telemetry::{ProcessHealthSample, TelemetrySink, TelemetrySinkError};

/// Match key reserved for internal records (heartbeats, operational events)
///
/// The sender skips this key during replay; internal records are never
/// forwarded to a destination.
pub const INTERNAL_KEY: &str = "@journal";

/// Size of the key length field in bytes
const KEY_LEN_FIELD_SIZE: usize = 2;

/// Size of the payload length field in bytes
const PAYLOAD_LEN_FIELD_SIZE: usize = 4;

const CURRENT_FILE: &str = "current.wal";
const OFFSETS_FILE: &str = "offsets.json";
const OFFSETS_TMP_FILE: &str = "offsets.json.tmp";
const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".wal";

/// Configuration for the journal layer
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Spool directory, created on open
    pub dir: PathBuf,

    /// Rotate `current.wal` once it reaches this many bytes
    pub max_file_bytes: u64,

    /// Rotate `current.wal` once it has been open this long
    pub rotate_interval: Duration,

    /// Journal operational events (`start`, `config_update`) as internal
    /// records
    pub events_enabled: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp/shunt"),
            max_file_bytes: 50 * 1024 * 1024,
            rotate_interval: Duration::from_secs(1800),
            events_enabled: false,
        }
    }
}

impl JournalConfig {
    /// Set the spool directory
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the rotation size threshold
    #[must_use]
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Set the rotation age threshold
    #[must_use]
    pub fn with_rotate_interval(mut self, interval: Duration) -> Self {
        self.rotate_interval = interval;
        self
    }

    /// Enable operational event records
    #[must_use]
    pub fn with_events(mut self, enabled: bool) -> Self {
        self.events_enabled = enabled;
        self
    }
}

/// Metrics for the journal layer
#[derive(Debug, Default)]
pub struct JournalMetrics {
    /// Records appended to the write-ahead file
    pub records_appended: AtomicU64,

    /// Frame bytes appended (headers included)
    pub bytes_appended: AtomicU64,

    /// Completed segment rotations
    pub segments_rotated: AtomicU64,

    /// Failed append attempts
    pub append_errors: AtomicU64,

    /// Operational events journaled
    pub events_journaled: AtomicU64,
}

impl JournalMetrics {
    #[inline]
    fn record_append(&self, bytes: u64) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    fn record_append_error(&self) {
        self.append_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_rotation(&self) {
        self.segments_rotated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_event(&self) {
        self.events_journaled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> JournalSnapshot {
        JournalSnapshot {
            records_appended: self.records_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            segments_rotated: self.segments_rotated.load(Ordering::Relaxed),
            append_errors: self.append_errors.load(Ordering::Relaxed),
            events_journaled: self.events_journaled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of journal metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalSnapshot {
    pub records_appended: u64,
    pub bytes_appended: u64,
    pub segments_rotated: u64,
    pub append_errors: u64,
    pub events_journaled: u64,
}

/// Write side of `current.wal`, guarded by one mutex
struct WriterState {
    writer: Option<File>,
    bytes_written: u64,
    opened_at: Instant,
}

impl WriterState {
    fn new() -> Self {
        Self {
            writer: None,
            bytes_written: 0,
            opened_at: Instant::now(),
        }
    }
}

/// Durable write-ahead spool
pub struct JournalLayer {
    config: JournalConfig,

    /// Writer for `current.wal`
    state: Mutex<WriterState>,

    /// Acknowledged byte offset per segment file
    acked: Mutex<BTreeMap<String, u64>>,

    /// Disambiguates segments rotated within the same millisecond
    rotation_seq: AtomicU64,

    metrics: JournalMetrics,
}

impl JournalLayer {
    /// Open a journal over the configured spool directory
    ///
    /// Creates the directory if needed and reloads the acknowledged-offset
    /// snapshot from a previous run. A snapshot that fails to parse is
    /// logged and dropped; replay then restarts from offset zero.
    pub fn open(config: JournalConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.dir)?;

        let offsets_path = config.dir.join(OFFSETS_FILE);
        let acked = match fs::read(&offsets_path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, u64>>(&bytes) {
                Ok(map) => {
                    tracing::debug!(segments = map.len(), "restored acknowledged offsets");
                    map
                }
                Err(e) => {
                    tracing::warn!(
                        path = %offsets_path.display(),
                        error = %e,
                        "offset snapshot unreadable, restarting replay from zero"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            config,
            state: Mutex::new(WriterState::new()),
            acked: Mutex::new(acked),
            rotation_seq: AtomicU64::new(0),
            metrics: JournalMetrics::default(),
        })
    }

    /// The spool directory
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Get the journal metrics
    #[inline]
    pub fn metrics(&self) -> &JournalMetrics {
        &self.metrics
    }

    /// Append one keyed payload to `current.wal`
    pub fn append(&self, key: &str, payload: &[u8]) -> io::Result<()> {
        match self.append_frame(key, payload) {
            Ok(frame_len) => {
                self.metrics.record_append(frame_len);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_append_error();
                Err(e)
            }
        }
    }

    fn append_frame(&self, key: &str, payload: &[u8]) -> io::Result<u64> {
        let key_bytes = key.as_bytes();
        let key_len = u16::try_from(key_bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "journal key too long"))?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "journal payload too large"))?;

        let mut frame =
            Vec::with_capacity(KEY_LEN_FIELD_SIZE + key_bytes.len() + PAYLOAD_LEN_FIELD_SIZE + payload.len());
        frame.extend_from_slice(&key_len.to_be_bytes());
        frame.extend_from_slice(key_bytes);
        frame.extend_from_slice(&payload_len.to_be_bytes());
        frame.extend_from_slice(payload);

        let mut state = self.state.lock();

        // A failed rotation must not lose the append; keep writing to the
        // previous file and retry rotation on the next call.
        if let Err(e) = self.rotate_if_due(&mut state) {
            tracing::warn!(error = %e, "journal rotation failed, continuing on current file");
        }

        let file = self.writer(&mut state)?;
        file.write_all(&frame)?;
        state.bytes_written += frame.len() as u64;
        Ok(frame.len() as u64)
    }

    fn writer<'a>(&self, state: &'a mut WriterState) -> io::Result<&'a mut File> {
        if state.writer.is_none() {
            let path = self.config.dir.join(CURRENT_FILE);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            state.bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
            state.opened_at = Instant::now();
            state.writer = Some(file);
        }
        state
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("journal writer closed"))
    }

    fn rotate_if_due(&self, state: &mut WriterState) -> io::Result<()> {
        let due = state.writer.is_some()
            && state.bytes_written > 0
            && (state.bytes_written >= self.config.max_file_bytes
                || state.opened_at.elapsed() >= self.config.rotate_interval);
        if !due {
            return Ok(());
        }
        self.rotate_locked(state)
    }

    fn rotate_locked(&self, state: &mut WriterState) -> io::Result<()> {
        let Some(file) = state.writer.take() else {
            return Ok(());
        };
        drop(file);

        let seq = self.rotation_seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{SEGMENT_PREFIX}{:013}-{seq:04}{SEGMENT_SUFFIX}", unix_millis());
        fs::rename(self.config.dir.join(CURRENT_FILE), self.config.dir.join(&name))?;

        state.bytes_written = 0;
        state.opened_at = Instant::now();
        self.metrics.record_rotation();
        tracing::debug!(segment = %name, "journal segment rotated");

        // Opportunistic snapshot so a crash loses at most one segment of
        // replay progress.
        if let Err(e) = self.flush_acknowledged_offsets() {
            tracing::warn!(error = %e, "offset snapshot after rotation failed");
        }
        Ok(())
    }

    /// Journal an operational event as an internal record
    ///
    /// No-op unless event records are enabled; append failures are logged
    /// and swallowed.
    pub fn log_event(&self, event: &str, detail: &str) {
        if !self.config.events_enabled {
            return;
        }
        let body = serde_json::json!({
            "ts": unix_millis(),
            "event": event,
            "detail": detail,
        })
        .to_string();
        match self.append(INTERNAL_KEY, body.as_bytes()) {
            Ok(()) => self.metrics.record_event(),
            Err(e) => tracing::warn!(event, error = %e, "failed to journal event"),
        }
    }

    /// Record sender progress through a segment
    ///
    /// Offsets only move forward; a stale acknowledgment is ignored.
    pub fn acknowledge(&self, segment: impl Into<String>, offset: u64) {
        let mut acked = self.acked.lock();
        let entry = acked.entry(segment.into()).or_insert(0);
        if offset > *entry {
            *entry = offset;
        }
    }

    /// The acknowledged offset for a segment, if any
    pub fn acknowledged(&self, segment: &str) -> Option<u64> {
        self.acked.lock().get(segment).copied()
    }

    /// Persist the acknowledged-offset map to `offsets.json`
    ///
    /// Written to a temp file and renamed into place, so a crash mid-write
    /// leaves the previous snapshot intact. Returns the number of segments
    /// in the snapshot.
    pub fn flush_acknowledged_offsets(&self) -> io::Result<usize> {
        let map = self.acked.lock().clone();
        let body = serde_json::to_vec_pretty(&map).map_err(io::Error::other)?;

        let tmp = self.config.dir.join(OFFSETS_TMP_FILE);
        fs::write(&tmp, &body)?;
        fs::rename(&tmp, self.config.dir.join(OFFSETS_FILE))?;
        Ok(map.len())
    }

    /// Rotated segment file names, oldest first
    pub fn segments(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(SEGMENT_PREFIX) && name.ends_with(SEGMENT_SUFFIX) {
                names.push(name.to_string());
            }
        }
        // Millis are zero-padded, so the lexical order is the rotation order.
        names.sort();
        Ok(names)
    }

    /// Full path of a segment file
    pub fn segment_path(&self, name: &str) -> PathBuf {
        self.config.dir.join(name)
    }

    /// Delete a fully-replayed segment and forget its offset
    pub fn remove_segment(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.segment_path(name))?;
        self.acked.lock().remove(name);
        Ok(())
    }
}

impl RouteConsumer for JournalLayer {
    fn name(&self) -> &str {
        "journal"
    }

    fn apply_routing_table(&self, table: &Arc<RoutingTable>) {
        self.log_event("config_update", &format!("routes={}", table.len()));
        tracing::debug!(consumer = "journal", routes = table.len(), "routing table applied");
    }
}

impl TelemetrySink for JournalLayer {
    fn report(&self, sample: &ProcessHealthSample) -> Result<(), TelemetrySinkError> {
        let body = serde_json::to_vec(sample).map_err(TelemetrySinkError::encode)?;
        self.append(INTERNAL_KEY, &body)
            .map_err(TelemetrySinkError::write)
    }
}

impl DurableState for JournalLayer {
    fn flush_acknowledged_offsets(&self) -> io::Result<usize> {
        JournalLayer::flush_acknowledged_offsets(self)
    }
}

impl std::fmt::Debug for JournalLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalLayer")
            .field("dir", &self.config.dir)
            .field("max_file_bytes", &self.config.max_file_bytes)
            .field("events_enabled", &self.config.events_enabled)
            .finish()
    }
}

/// One record read back from a journal file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Destination match key (or [`INTERNAL_KEY`])
    pub key: String,

    /// Payload bytes
    pub payload: Vec<u8>,
}

/// Sequential reader over one journal file
///
/// Tracks its byte position so the sender can acknowledge exactly how far
/// it replayed.
pub struct SegmentReader {
    reader: BufReader<File>,
    position: u64,
}

impl SegmentReader {
    /// Open a journal file for reading from the start
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open a journal file for reading from a byte offset
    pub fn open_at(path: impl AsRef<Path>, offset: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(Self {
            reader: BufReader::new(file),
            position: offset,
        })
    }

    /// Byte offset just past the last entry read
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next entry
    ///
    /// Returns `None` at a clean end of file; a frame truncated mid-record
    /// is an error.
    pub fn read_entry(&mut self) -> io::Result<Option<JournalEntry>> {
        let mut key_len_bytes = [0u8; KEY_LEN_FIELD_SIZE];
        match self.reader.read_exact(&mut key_len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let key_len = u16::from_be_bytes(key_len_bytes) as usize;

        let mut key_bytes = vec![0u8; key_len];
        self.reader.read_exact(&mut key_bytes)?;
        let key = String::from_utf8(key_bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "journal key is not UTF-8"))?;

        let mut payload_len_bytes = [0u8; PAYLOAD_LEN_FIELD_SIZE];
        self.reader.read_exact(&mut payload_len_bytes)?;
        let payload_len = u32::from_be_bytes(payload_len_bytes) as usize;

        let mut payload = vec![0u8; payload_len];
        self.reader.read_exact(&mut payload)?;

        self.position +=
            (KEY_LEN_FIELD_SIZE + key_len + PAYLOAD_LEN_FIELD_SIZE + payload_len) as u64;
        Ok(Some(JournalEntry { key, payload }))
    }

    /// Read all remaining entries
    pub fn read_all(&mut self) -> io::Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
