//! File-locked JSON persistence layer (SPEC_FULL.md §4.7).
//!
//! One document per tenant: `events_<team_id>.json`, or `events_database.json`
//! when no tenant context is bound. A sibling lockfile guards the whole
//! load→mutate→save cycle; the atomic rename in [`crate::util::atomic_write_str`]
//! makes every save instantaneous from a reader's point of view.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::KernelError;
use crate::migrations::backfill_defaults;
use crate::types::Database;
use crate::util::atomic_write_str;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Path to the tenant's state document.
pub fn state_path(state_dir: &Path, team_id: Option<&str>) -> PathBuf {
    match team_id {
        Some(id) if !id.is_empty() => state_dir.join(format!("events_{id}.json")),
        _ => state_dir.join("events_database.json"),
    }
}

fn lock_path(state_path: &Path) -> PathBuf {
    let name = state_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    state_path.with_file_name(format!(".{name}.lock"))
}

/// A held lock on a tenant's state file. Dropping it releases the lock by
/// deleting the lockfile, regardless of whether the caller saved anything.
pub struct StateLock {
    lock_file: PathBuf,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to release lock {}: {e}", self.lock_file.display());
            }
        }
    }
}

fn acquire_lock(path: &Path) -> Result<StateLock, KernelError> {
    let lock_file = lock_path(path);
    if let Some(parent) = lock_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let deadline = Instant::now() + LOCK_TIMEOUT;
    loop {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_file)
        {
            Ok(_) => {
                log::debug!("acquired lock {}", lock_file.display());
                return Ok(StateLock { lock_file });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Instant::now() >= deadline {
                    log::warn!("lock timeout on {}", lock_file.display());
                    return Err(KernelError::LockTimeout(LOCK_TIMEOUT));
                }
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(e) => return Err(KernelError::from(e)),
        }
    }
}

/// Load (or initialize) the tenant's database under a held lock, run the
/// defaults backfill, and return both. The lock must be held for the
/// lifetime of the load→mutate→save cycle.
pub fn load_locked(state_dir: &Path, team_id: Option<&str>) -> Result<(StateLock, Database), KernelError> {
    let path = state_path(state_dir, team_id);
    let lock = acquire_lock(&path)?;
    let db = match fs::read_to_string(&path) {
        Ok(contents) => {
            let mut db: Database = serde_json::from_str(&contents)
                .map_err(|e| KernelError::CorruptState(path.display().to_string(), e.to_string()))?;
            backfill_defaults(&mut db);
            db
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("no state document at {}, starting fresh", path.display());
            let mut db = Database::default();
            backfill_defaults(&mut db);
            db
        }
        Err(e) => return Err(KernelError::from(e)),
    };
    Ok((lock, db))
}

/// Persist the database atomically. The lock is still held by the caller
/// (it is not released here; the caller drops it after save).
pub fn save(state_dir: &Path, team_id: Option<&str>, db: &Database, debug: bool) -> Result<(), KernelError> {
    let path = state_path(state_dir, team_id);
    let body = serde_json::to_string_pretty(db)?;

    if debug {
        let snapshot_path = lock_path(&path).with_extension("pre-save.json");
        if let Err(e) = atomic_write_str(&snapshot_path, &body) {
            log::warn!("debug pre-save snapshot failed: {e}");
        }
    }

    atomic_write_str(&path, &body)?;
    log::debug!("saved state document {}", path.display());
    Ok(())
}
