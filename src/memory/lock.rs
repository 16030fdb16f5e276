//! Advisory per-source file locking.
//!
//! A rollover or intake operation acquires an exclusive lock on the specific
//! source before reading its size, and the lock is released unconditionally
//! on exit (RAII `Drop`), including on error. Concurrency safety is scoped to
//! a single host. A lock left behind by a killed process is considered stale
//! after [`STALE_LOCK_SECS`] and reclaimed; a live lock is never force-broken.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MemoryError, Result};

/// Age after which an existing lock file is assumed abandoned.
const STALE_LOCK_SECS: u64 = 3600;

/// Exclusive advisory lock on one source. Dropping it removes the lock file.
#[derive(Debug)]
pub struct SourceLock {
    lock_path: PathBuf,
}

impl SourceLock {
    /// Acquire the lock for a source path, or fail with
    /// [`MemoryError::LockContention`] if another operation holds it.
    pub fn acquire(source_path: &Path) -> Result<Self> {
        let lock_path = lock_path_for(source_path);
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match try_create(&lock_path) {
            Ok(lock) => Ok(lock),
            Err(MemoryError::LockContention { .. }) if is_stale(&lock_path) => {
                tracing::warn!(lock = %lock_path.display(), "removing stale lock file");
                let _ = std::fs::remove_file(&lock_path);
                try_create(&lock_path).map_err(|_| MemoryError::LockContention {
                    path: source_path.to_path_buf(),
                })
            }
            Err(MemoryError::LockContention { .. }) => Err(MemoryError::LockContention {
                path: source_path.to_path_buf(),
            }),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn try_create(lock_path: &Path) -> Result<SourceLock> {
    match OpenOptions::new().write(true).create_new(true).open(lock_path) {
        Ok(mut file) => {
            let _ = writeln!(file, "{}", std::process::id());
            Ok(SourceLock {
                lock_path: lock_path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(MemoryError::LockContention {
                path: lock_path.to_path_buf(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn is_stale(lock_path: &Path) -> bool {
    lock_path
        .metadata()
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > Duration::from_secs(STALE_LOCK_SECS))
        .unwrap_or(false)
}

/// Lock file location: a sibling `<name>.lock` for files, `.mnemo.lock`
/// inside the directory for directory sources.
fn lock_path_for(source_path: &Path) -> PathBuf {
    if source_path.is_dir() {
        source_path.join(".mnemo.lock")
    } else {
        let mut name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".into());
        name.push_str(".lock");
        source_path.with_file_name(name)
    }
}
