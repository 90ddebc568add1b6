//! Dev-mode debug snapshot trail for step transitions.
//!
//! Gated by `OE_DEBUG=1` (SPEC_FULL.md §4.2, §4.7): the dispatcher writes a
//! snapshot of the event record after every step so a failing turn can be
//! replayed by hand. Never runs in production; never affects the turn's
//! outcome if the write fails.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::util::atomic_write_str;

/// How many days to keep debug snapshots before pruning.
pub const SNAPSHOT_RETENTION_DAYS: u32 = 7;

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Write a per-step debug snapshot of an event record.
///
/// Creates `{state_dir}/_debug/{timestamp}_{event_id}_step{step}.json`.
/// Returns the path written. Logs and swallows failures — a debug aid must
/// never fail the turn it is observing.
pub fn write_step_snapshot<T: Serialize>(
    state_dir: &Path,
    event_id: &str,
    step: u8,
    snapshot: &T,
) -> Option<PathBuf> {
    let debug_dir = state_dir.join("_debug");
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let safe_id = sanitize_id(event_id);
    let filename = format!("{timestamp}_{safe_id}_step{step}.json");
    let file_path = debug_dir.join(&filename);

    let body = match serde_json::to_string_pretty(snapshot) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("debug snapshot serialization failed for {event_id}: {e}");
            return None;
        }
    };

    match atomic_write_str(&file_path, &body) {
        Ok(()) => Some(file_path),
        Err(e) => {
            log::warn!("debug snapshot write failed for {event_id}: {e}");
            None
        }
    }
}

/// Delete debug snapshots older than the retention period. Returns the
/// number of files pruned.
pub fn prune_snapshots(state_dir: &Path) -> usize {
    let debug_dir = state_dir.join("_debug");
    if !debug_dir.exists() {
        return 0;
    }

    let cutoff = Utc::now() - chrono::Duration::days(SNAPSHOT_RETENTION_DAYS as i64);
    let cutoff_secs = cutoff.timestamp();

    let entries = match std::fs::read_dir(&debug_dir) {
        Ok(e) => e,
        Err(_) => return 0,
    };

    let mut pruned = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let mtime_secs = match path.metadata().and_then(|m| m.modified()) {
            Ok(t) => t
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            Err(_) => continue,
        };
        if mtime_secs < cutoff_secs && std::fs::remove_file(&path).is_ok() {
            pruned += 1;
        }
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_step_snapshot_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_step_snapshot(dir.path(), "evt-acme-1", 3, &json!({"current_step": 3}))
            .expect("write should succeed");
        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("current_step"));
        assert!(path.to_str().unwrap().contains("_debug"));
        assert!(path.to_str().unwrap().contains("evt-acme-1"));
    }

    #[test]
    fn test_write_step_snapshot_sanitizes_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_step_snapshot(dir.path(), "foo/bar baz", 1, &json!({})).unwrap();
        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(!filename.contains('/'));
        assert!(!filename.contains(' '));
    }

    #[test]
    fn test_prune_removes_old_keeps_recent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recent = write_step_snapshot(dir.path(), "recent", 1, &json!({})).unwrap();
        let old = write_step_snapshot(dir.path(), "old", 1, &json!({})).unwrap();

        let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(14 * 24 * 3600);
        filetime::set_file_mtime(&old, filetime::FileTime::from_system_time(old_time)).expect("set mtime");

        let pruned = prune_snapshots(dir.path());

        assert_eq!(pruned, 1);
        assert!(!old.exists());
        assert!(recent.exists());
    }
}
