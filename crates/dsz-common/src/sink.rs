//! Operational log sink
//!
//! The sink is an append-only destination for human-readable lines of the form
//! `[YYYY-MM-DD HH:MM:SS] [LEVEL] message`. Components never reach for a global
//! logger to write it: they are constructed with a [`SyncLog`] handle that
//! owns an `Arc<dyn Sink>`.
//!
//! Rotation is the sink's own business. [`RotatingFileSink`] rotates by size,
//! keeping a fixed number of numbered backups (`sync.log.1` is the newest).

use crate::error::{CommonError, Result};
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Timestamp layout used for every sink line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only line destination
pub trait Sink: Send + Sync {
    /// Append one line. The sink adds the trailing newline.
    fn append(&self, line: &str) -> Result<()>;
}

/// Severity written into the `[LEVEL]` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl SinkLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkLevel::Info => "INFO",
            SinkLevel::Warning => "WARNING",
            SinkLevel::Error => "ERROR",
            SinkLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for SinkLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a sink line for the given wall-clock time
pub fn format_line(timestamp: DateTime<Local>, level: SinkLevel, message: &str) -> String {
    format!("[{}] [{}] {}", timestamp.format(TIMESTAMP_FORMAT), level, message)
}

// ============================================================================
// File sink
// ============================================================================

/// File sink with size-based rotation
pub struct RotatingFileSink {
    path: PathBuf,
    /// `None` disables rotation entirely
    max_size: Option<u64>,
    max_backups: u32,
    // Serializes rotate + append so two writers never shift backups at once
    write_lock: Mutex<()>,
}

impl RotatingFileSink {
    /// Create a rotating sink, creating the parent directory if needed
    pub fn new(path: impl Into<PathBuf>, max_size: u64, max_backups: u32) -> Result<Self> {
        Self::build(path.into(), Some(max_size), max_backups)
    }

    /// Create a sink that only ever appends
    pub fn append_only(path: impl Into<PathBuf>) -> Result<Self> {
        Self::build(path.into(), None, 0)
    }

    fn build(path: PathBuf, max_size: Option<u64>, max_backups: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            path,
            max_size,
            max_backups,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the live log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the numbered backup `n` (1 is the most recent)
    pub fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    fn rotate_if_needed(&self) -> Result<()> {
        let Some(max_size) = self.max_size else {
            return Ok(());
        };

        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() > max_size => self.rotate(),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn rotate(&self) -> Result<()> {
        if self.max_backups == 0 {
            fs::remove_file(&self.path)?;
            return Ok(());
        }

        let oldest = self.backup_path(self.max_backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (1..self.max_backups).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        fs::rename(&self.path, self.backup_path(1))?;
        Ok(())
    }
}

impl Sink for RotatingFileSink {
    fn append(&self, line: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| CommonError::Sink(format!("Log sink lock poisoned: {}", e)))?;

        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

// ============================================================================
// In-memory and null sinks
// ============================================================================

/// Sink that keeps every line in memory
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all lines appended so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl Sink for MemorySink {
    fn append(&self, line: &str) -> Result<()> {
        self.lines
            .lock()
            .map_err(|e| CommonError::Sink(format!("Memory sink lock poisoned: {}", e)))?
            .push(line.to_string());
        Ok(())
    }
}

/// Sink that drops everything
pub struct NullSink;

impl Sink for NullSink {
    fn append(&self, _line: &str) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// SyncLog handle
// ============================================================================

/// Cloneable logging handle passed into each sync component
///
/// Every line goes to the sink and is mirrored as a `tracing` event so it
/// also shows on the console. A failing sink never fails the caller.
#[derive(Clone)]
pub struct SyncLog {
    sink: Arc<dyn Sink>,
}

impl SyncLog {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }

    /// Handle that writes nowhere except `tracing`
    pub fn discard() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(SinkLevel::Info, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.record(SinkLevel::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(SinkLevel::Error, message.as_ref());
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.record(SinkLevel::Critical, message.as_ref());
    }

    fn record(&self, level: SinkLevel, message: &str) {
        match level {
            SinkLevel::Info => tracing::info!("{}", message),
            SinkLevel::Warning => tracing::warn!("{}", message),
            SinkLevel::Error => tracing::error!("{}", message),
            SinkLevel::Critical => tracing::error!(critical = true, "{}", message),
        }

        let line = format_line(Local::now(), level, message);
        if let Err(e) = self.sink.append(&line) {
            tracing::warn!(error = %e, "Failed to append to log sink");
        }
    }
}

impl std::fmt::Debug for SyncLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_format_line() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            format_line(ts, SinkLevel::Warning, "Rate Limit Hit (429)."),
            "[2024-03-09 07:05:01] [WARNING] Rate Limit Hit (429)."
        );
    }

    #[test]
    fn test_sync_log_writes_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let log = SyncLog::new(sink.clone());

        log.info("Starting Streaming Download...");
        log.error("Token refresh failed. Still getting 401.");

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] Starting Streaming Download..."));
        assert!(lines[1].contains("[ERROR] Token refresh failed"));
    }

    #[test]
    fn test_file_sink_creates_directory_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("sync.log");
        let sink = RotatingFileSink::new(&path, 1024, 3).unwrap();

        sink.append("first").unwrap();
        sink.append("second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_file_sink_rotates_when_over_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.log");
        let sink = RotatingFileSink::new(&path, 10, 2).unwrap();

        // Each append checks the size before writing
        sink.append("aaaaaaaaaaaa").unwrap(); // 13 bytes, no rotation yet
        sink.append("bbbbbbbbbbbb").unwrap(); // rotates a -> .1
        sink.append("cccccccccccc").unwrap(); // rotates .1 -> .2, b -> .1
        sink.append("dddddddddddd").unwrap(); // drops .2 (a), shifts again

        assert_eq!(fs::read_to_string(&path).unwrap(), "dddddddddddd\n");
        assert_eq!(
            fs::read_to_string(sink.backup_path(1)).unwrap(),
            "cccccccccccc\n"
        );
        assert_eq!(
            fs::read_to_string(sink.backup_path(2)).unwrap(),
            "bbbbbbbbbbbb\n"
        );
        assert!(!sink.backup_path(3).exists());
    }

    #[test]
    fn test_append_only_sink_never_rotates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync_summary.log");
        let sink = RotatingFileSink::append_only(&path).unwrap();

        for _ in 0..50 {
            sink.append("[2024-01-01 00:00:00] SUCCESS | Duration: 1.00s | Products: 3")
                .unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 50);
        assert!(!sink.backup_path(1).exists());
    }
}
