//! Log sink with close-and-reopen rotation
//!
//! When a log file is configured, all formatted log output goes through a
//! [`LogSink`] that can swap its file handle at runtime. External log
//! management (logrotate and friends) renames the file and signals the
//! process; [`LogSink::rotate`] then reopens the original path and swaps
//! the new handle in atomically. Writers in flight finish on the old
//! handle and every later write lands in the new file.
//!
//! Without a configured file the sink degrades to stderr and rotation
//! becomes a no-op that reports [`LogRotationError::NoLogFile`].

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::LogRotationError;

/// Where formatted log output goes: a reopenable file, or stderr
pub struct LogSink {
    path: Option<PathBuf>,
    file: ArcSwapOption<Mutex<File>>,
}

impl LogSink {
    /// A sink that writes to stderr and cannot rotate
    pub fn stderr() -> Self {
        Self {
            path: None,
            file: ArcSwapOption::const_empty(),
        }
    }

    /// Open `path` for appending and log through it
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the file cannot be created or opened.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            path: Some(path),
            file: ArcSwapOption::new(Some(Arc::new(Mutex::new(file)))),
        })
    }

    /// The configured log file path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reopen the log path and swap the new handle in
    ///
    /// # Errors
    ///
    /// [`LogRotationError::NoLogFile`] when logging goes to stderr;
    /// [`LogRotationError::Reopen`] when the path cannot be reopened, in
    /// which case the previous handle stays active and keeps receiving
    /// writes.
    pub fn rotate(&self) -> Result<(), LogRotationError> {
        let Some(ref path) = self.path else {
            return Err(LogRotationError::NoLogFile);
        };

        let file = open_append(path)
            .map_err(|e| LogRotationError::reopen(path.display().to_string(), e))?;
        self.file.store(Some(Arc::new(Mutex::new(file))));
        Ok(())
    }

    /// A writer over the current sink, for `tracing_subscriber`'s fmt layer
    pub fn writer(self: &Arc<Self>) -> LogWriter {
        LogWriter {
            sink: Arc::clone(self),
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// `io::Write` adapter that always resolves the sink's current handle
///
/// Construct one per formatted record (the fmt layer's `MakeWriter`
/// contract) so a rotation between records takes effect immediately.
pub struct LogWriter {
    sink: Arc<LogSink>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.sink.file.load_full() {
            Some(file) => file.lock().write(buf),
            None => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.file.load_full() {
            Some(file) => file.lock().flush(),
            None => io::stderr().lock().flush(),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
