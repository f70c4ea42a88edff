//! Directory-backed lock table.
//!
//! Each lock is one JSON file, `<dir>/<name>.lock`, holding a [`LockRecord`].
//! Conditional writes are serialized per lock by an exclusive advisory lock
//! on `<dir>/<name>.lock.guard`, so only one process at a time can run the
//! read-check-write for that name. Records are replaced with write-to-temp +
//! rename so readers never see a partial file.
//!
//! The guard file itself is never removed: the kernel drops the advisory
//! lock when its holder closes the file or dies, so there is no abandoned
//! guard to reclaim, and unlinking a file someone else has open would let
//! two writers lock different inodes under the same name.

use super::LockStore;
use crate::error::{LockError, Result};
use crate::lock::{LockRecord, validate_name};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default time to wait for a busy guard before giving up.
pub const DEFAULT_GUARD_TIMEOUT: Duration = Duration::from_secs(2);

const GUARD_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    guard_timeout: Duration,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            guard_timeout: DEFAULT_GUARD_TIMEOUT,
        }
    }

    /// How long a conditional write waits for another process's guard.
    pub fn with_guard_timeout(mut self, timeout: Duration) -> Self {
        self.guard_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `name`.
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", name))
    }

    fn guard_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock.guard", name))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                LockError::StoreUnavailable(format!(
                    "failed to create lock directory '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Run `op` while holding the guard for `name`.
    fn with_guard<T>(&self, name: &str, op: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        validate_name(name)?;
        self.ensure_dir()?;
        let _guard = self.take_guard(name)?;
        op(&self.record_path(name))
    }

    fn take_guard(&self, name: &str) -> Result<GuardFile> {
        let path = self.guard_path(name);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                LockError::StoreUnavailable(format!(
                    "failed to open guard '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        let started = Instant::now();

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(GuardFile { _file: file }),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= self.guard_timeout {
                        return Err(LockError::StoreUnavailable(format!(
                            "timed out waiting for guard '{}'",
                            path.display()
                        )));
                    }
                    std::thread::sleep(GUARD_POLL);
                }
                Err(e) => {
                    return Err(LockError::StoreUnavailable(format!(
                        "failed to lock guard '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
    }
}

/// Holds the advisory lock until dropped; closing the file releases it.
#[derive(Debug)]
struct GuardFile {
    _file: File,
}

fn read_record(path: &Path) -> Result<Option<LockRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LockError::StoreUnavailable(format!(
                "failed to read lock file '{}': {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        LockError::StoreUnavailable(format!(
            "failed to parse lock file '{}': {}",
            path.display(),
            e
        ))
    })
}

fn write_record(path: &Path, record: &LockRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).map_err(|e| {
        LockError::StoreUnavailable(format!("failed to serialize lock record: {}", e))
    })?;
    atomic_write(path, json.as_bytes())
}

/// Write to `.<file>.tmp` beside `path`, sync, then rename over `path`.
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LockError::UserError("invalid lock file path".to_string()))?;
    let temp_path = parent.join(format!(".{}.tmp", filename));

    let io_err = |what: &str, e: std::io::Error| {
        let _ = fs::remove_file(&temp_path);
        LockError::StoreUnavailable(format!("failed to {} '{}': {}", what, path.display(), e))
    };

    let mut file = File::create(&temp_path).map_err(|e| io_err("create temp file for", e))?;
    file.write_all(content)
        .map_err(|e| io_err("write temp file for", e))?;
    file.sync_all().map_err(|e| io_err("sync temp file for", e))?;
    fs::rename(&temp_path, path).map_err(|e| io_err("replace", e))?;

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn remove_record(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| {
        LockError::StoreUnavailable(format!(
            "failed to remove lock file '{}': {}",
            path.display(),
            e
        ))
    })
}

impl LockStore for FileStore {
    fn put_if_absent_or_expired(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<bool> {
        self.with_guard(&record.name, |path| {
            if let Some(existing) = read_record(path)?
                && !existing.is_expired(now)
            {
                return Ok(false);
            }
            write_record(path, record)?;
            Ok(true)
        })
    }

    fn delete_if_owner(&self, name: &str, owner: &str) -> Result<bool> {
        self.with_guard(name, |path| match read_record(path)? {
            Some(existing) if existing.owner == owner => {
                remove_record(path)?;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn update_if_owner(
        &self,
        name: &str,
        owner: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_guard(name, |path| match read_record(path)? {
            Some(mut existing)
                if existing.owner == owner && existing.expires_at < new_expires_at =>
            {
                existing.expires_at = new_expires_at;
                write_record(path, &existing)?;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>> {
        validate_name(name)?;
        read_record(&self.record_path(name))
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| {
            LockError::StoreUnavailable(format!(
                "failed to read lock directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                LockError::StoreUnavailable(format!("failed to read lock directory entry: {}", e))
            })?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }

            match read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "skipping unreadable lock file"),
            }
        }

        Ok(records)
    }

    fn delete(&self, name: &str) -> Result<Option<LockRecord>> {
        self.with_guard(name, |path| {
            let existing = match read_record(path) {
                Ok(existing) => existing,
                Err(e) => {
                    // Corrupt records are exactly what force-clear is for.
                    tracing::warn!(error = %e, "removing unreadable lock file");
                    remove_record(path)?;
                    return Ok(None);
                }
            };
            if existing.is_some() {
                remove_record(path)?;
            }
            Ok(existing)
        })
    }
}
