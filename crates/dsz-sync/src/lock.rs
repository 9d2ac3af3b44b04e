//! Process lock
//!
//! Single-flight guard for sync sessions. The lock is an OS advisory
//! exclusive lock on the lock artifact (non-blocking), with the holder's PID
//! written into the file for operators and for the `status` command.
//!
//! Release is tied to [`LockGuard`]'s `Drop`: it runs on normal return, on
//! error propagation, on panic unwinding, and when `main` drops the session
//! future after a termination signal. A SIGKILL skips it; the next run then
//! finds the artifact present but unlocked and cleans up after it.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::units::format_age;
use dsz_common::SyncLog;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Attempts made when the locked file turns out to be unlinked underneath us
const IDENTITY_ATTEMPTS: u32 = 3;

/// Result of a lock attempt
#[derive(Debug)]
pub enum LockOutcome {
    /// This process now owns the session
    Acquired(LockGuard),
    /// Another process holds the lock
    AlreadyRunning {
        pid: Option<u32>,
        held_for: Option<Duration>,
    },
}

/// Observed state of the lock artifact, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Free,
    /// Artifact present but nobody holds it (previous run was killed)
    Abandoned { pid: Option<u32> },
    Held {
        pid: Option<u32>,
        held_for: Option<Duration>,
    },
}

/// Lock factory for one artifact path
#[derive(Debug, Clone)]
pub struct ProcessLock {
    lock_path: PathBuf,
    temp_path: PathBuf,
    stale_after: Duration,
    log: SyncLog,
}

impl ProcessLock {
    pub fn new(
        lock_path: impl Into<PathBuf>,
        temp_path: impl Into<PathBuf>,
        stale_after: Duration,
        log: SyncLog,
    ) -> Self {
        Self {
            lock_path: lock_path.into(),
            temp_path: temp_path.into(),
            stale_after,
            log,
        }
    }

    pub fn from_config(config: &SyncConfig, log: SyncLog) -> Self {
        Self::new(
            config.lock_path(),
            config.temp_output_path(),
            Duration::from_secs(config.sync.stale_lock_secs),
            log,
        )
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Try to take the lock without blocking
    ///
    /// `AlreadyRunning` is a normal outcome, not an error.
    pub fn acquire(&self) -> Result<LockOutcome> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        for attempt in 1..=IDENTITY_ATTEMPTS {
            // No truncate: the current holder's PID must survive our open
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.lock_path)
                .map_err(|e| {
                    SyncError::lock(format!(
                        "Cannot open lock file {}: {}",
                        self.lock_path.display(),
                        e
                    ))
                })?;

            match file.try_lock() {
                Ok(()) => {},
                Err(TryLockError::WouldBlock) => return Ok(self.report_held(&mut file)),
                Err(TryLockError::Error(e)) => {
                    return Err(SyncError::lock(format!(
                        "Cannot lock {}: {}",
                        self.lock_path.display(),
                        e
                    )));
                },
            }

            if !self.still_at_path(&file) {
                debug!(attempt, "Locked file was replaced before we held it, retrying");
                let _ = file.unlock();
                continue;
            }

            // Only a run that wrote its PID and never released leaves content behind
            let leftover = file.metadata().map(|m| m.len() > 0).unwrap_or(false);
            if leftover {
                self.clean_up_after_previous_run(&mut file);
            }

            write_pid(&mut file).map_err(|e| {
                SyncError::lock(format!(
                    "Cannot write PID to {}: {}",
                    self.lock_path.display(),
                    e
                ))
            })?;

            debug!(path = %self.lock_path.display(), pid = std::process::id(), "Lock acquired");

            return Ok(LockOutcome::Acquired(LockGuard {
                file,
                lock_path: self.lock_path.clone(),
                temp_path: self.temp_path.clone(),
                log: self.log.clone(),
            }));
        }

        Err(SyncError::lock(format!(
            "Lock file {} kept changing while locking",
            self.lock_path.display()
        )))
    }

    /// Report the lock state without taking it
    pub fn inspect(&self) -> Result<LockState> {
        let mut file = match OpenOptions::new().read(true).open(&self.lock_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LockState::Free),
            Err(e) => return Err(e.into()),
        };

        match file.try_lock() {
            Ok(()) => {
                let pid = read_pid(&mut file);
                let _ = file.unlock();
                Ok(LockState::Abandoned { pid })
            },
            Err(TryLockError::WouldBlock) => Ok(LockState::Held {
                pid: read_pid(&mut file),
                held_for: artifact_age(&self.lock_path),
            }),
            Err(TryLockError::Error(e)) => Err(e.into()),
        }
    }

    fn report_held(&self, file: &mut File) -> LockOutcome {
        let pid = read_pid(file);
        let held_for = artifact_age(&self.lock_path);

        if let Some(age) = held_for.filter(|age| *age > self.stale_after) {
            self.log.warning(format!(
                "Lock held by PID {} for {}, longer than expected. Leaving it in place.",
                display_pid(pid),
                format_age(age)
            ));
        }

        self.log.info("Script is already running (Locked). Exiting.");
        LockOutcome::AlreadyRunning { pid, held_for }
    }

    fn clean_up_after_previous_run(&self, file: &mut File) {
        let pid = read_pid(file);
        let age = artifact_age(&self.lock_path)
            .map(format_age)
            .unwrap_or_else(|| "unknown age".to_string());

        self.log.warning(format!(
            "Found lock file from PID {} ({} old) that was never released. Previous run did not exit cleanly.",
            display_pid(pid),
            age
        ));

        match fs::remove_file(&self.temp_path) {
            Ok(()) => self.log.warning(format!(
                "Removed dangling temporary file {}",
                self.temp_path.display()
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => debug!(error = %e, "Could not remove dangling temporary file"),
        }
    }

    #[cfg(unix)]
    fn still_at_path(&self, file: &File) -> bool {
        use std::os::unix::fs::MetadataExt;

        match (file.metadata(), fs::metadata(&self.lock_path)) {
            (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    fn still_at_path(&self, _file: &File) -> bool {
        self.lock_path.exists()
    }
}

/// Held session lock; dropping it releases everything
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    lock_path: PathBuf,
    temp_path: PathBuf,
    log: SyncLog,
}

impl LockGuard {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Temp and artifact are removed while the lock is still held
        match fs::remove_file(&self.temp_path) {
            Ok(()) => debug!(path = %self.temp_path.display(), "Removed temporary output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => self.log.warning(format!(
                "Could not remove temporary file {}: {}",
                self.temp_path.display(),
                e
            )),
        }

        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.log.warning(format!(
                    "Could not remove lock file {}: {}",
                    self.lock_path.display(),
                    e
                ));
            }
        }

        if let Err(e) = self.file.unlock() {
            debug!(error = %e, "Unlock failed; the descriptor close releases it");
        }
    }
}

fn write_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

fn artifact_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn display_pid(pid: Option<u32>) -> String {
    pid.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
