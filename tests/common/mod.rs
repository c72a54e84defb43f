#![allow(dead_code)]

use pathlock::{BackendKind, LockHandle, LockingConfig};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Config for `kind` with a short poll interval and a database inside `temp`.
pub fn config_for(temp: &TempDir, kind: BackendKind, threaded: bool) -> LockingConfig {
    LockingConfig {
        backend: kind,
        threaded,
        poll_interval_ms: 5,
        database_path: Some(temp.path().join("locks.sqlite3")),
        ..LockingConfig::default()
    }
}

pub fn protected_path(temp: &TempDir) -> PathBuf {
    temp.path().join("trash")
}

pub fn open_handle(temp: &TempDir, kind: BackendKind) -> LockHandle {
    LockHandle::open(protected_path(temp), &config_for(temp, kind, true))
        .expect("handle should open")
}

pub fn open_unthreaded(temp: &TempDir, kind: BackendKind) -> LockHandle {
    LockHandle::open(protected_path(temp), &config_for(temp, kind, false))
        .expect("handle should open")
}

/// Polls until `path` exists or `limit` elapses.
pub fn wait_for_file(path: &Path, limit: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if path.exists() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    path.exists()
}
