// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Locking backed by rows in an embedded SQLite database.
//!
//! Each lock is one row keyed by the protected path. The primary key makes
//! the insert the claim: a second insert for the same key violates the
//! constraint and the transaction is rolled back.

use crate::error::{LockError, Result};
use crate::identity::Identity;
use crate::locking::backend::{BackendKind, Claim, LockBackend};
use crate::locking::target::LockTarget;
use chrono::Utc;
use log::debug;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a statement waits for SQLite's own file lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS locks (
    lock_path   TEXT PRIMARY KEY NOT NULL,
    host        TEXT NOT NULL,
    pid         INTEGER NOT NULL,
    thread_id   INTEGER,
    acquired_at TEXT NOT NULL
)";

const SELECT_OWNER: &str = "SELECT host, pid, thread_id FROM locks WHERE lock_path = ?1";

#[derive(Debug)]
pub struct RecordStoreBackend {
    database: PathBuf,
    connection: Mutex<Connection>,
}

impl RecordStoreBackend {
    /// Opens (creating if needed) the lock database at `database`.
    pub fn open<P: Into<PathBuf>>(database: P) -> Result<Self> {
        let database = database.into();
        let connection = Connection::open(&database).map_err(|err| store_failure(&database, err))?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .and_then(|()| connection.execute_batch(SCHEMA))
            .map_err(|err| store_failure(&database, err))?;

        debug!("Opened lock record store {}", database.display());
        Ok(Self {
            database,
            connection: Mutex::new(connection),
        })
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    fn connection(&self, target: &LockTarget) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| LockError::failed(target, "record store connection is poisoned"))
    }
}

impl LockBackend for RecordStoreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RecordStore
    }

    fn try_claim(&self, target: &LockTarget, owner: &Identity) -> Result<Claim> {
        let mut connection = self.connection(target)?;
        let tx = begin(&mut connection, target)?;

        let inserted = tx.execute(
            "INSERT INTO locks (lock_path, host, pid, thread_id, acquired_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                target.key(),
                owner.host(),
                owner.process_id(),
                owner.thread_id().map(|thread| thread as i64),
                Utc::now().to_rfc3339()
            ],
        );

        match inserted {
            Ok(_) => {
                tx.commit().map_err(|err| row_failure(target, err))?;
                debug!("Claimed record lock {target} for {owner}");
                Ok(Claim::Acquired)
            }
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                let holder = select_owner(&tx, target).ok().flatten();
                tx.rollback().map_err(|err| row_failure(target, err))?;
                Ok(Claim::Contended(holder))
            }
            Err(err) => Err(row_failure(target, err)),
        }
    }

    fn release(&self, target: &LockTarget, owner: &Identity) -> Result<()> {
        let mut connection = self.connection(target)?;
        let tx = begin(&mut connection, target)?;

        match select_owner(&tx, target).map_err(|err| row_failure(target, err))? {
            None => Err(LockError::NotLocked {
                target: target.label(),
            }),
            Some(holder) if holder != *owner => Err(LockError::NotMyLock {
                target: target.label(),
                owner: Some(holder),
            }),
            Some(_) => {
                tx.execute("DELETE FROM locks WHERE lock_path = ?1", params![target.key()])
                    .map_err(|err| row_failure(target, err))?;
                tx.commit().map_err(|err| row_failure(target, err))?;
                debug!("Released record lock {target}");
                Ok(())
            }
        }
    }

    fn current_owner(&self, target: &LockTarget) -> Result<Option<Identity>> {
        let connection = self.connection(target)?;
        connection
            .query_row(SELECT_OWNER, params![target.key()], owner_from_row)
            .optional()
            .map_err(|err| row_failure(target, err))
    }

    fn force_clear(&self, target: &LockTarget) -> Result<()> {
        let connection = self.connection(target)?;
        let removed = connection
            .execute("DELETE FROM locks WHERE lock_path = ?1", params![target.key()])
            .map_err(|err| row_failure(target, err))?;
        if removed > 0 {
            debug!("Broke record lock {target}");
        }
        Ok(())
    }
}

fn begin<'c>(connection: &'c mut Connection, target: &LockTarget) -> Result<Transaction<'c>> {
    connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| row_failure(target, err))
}

fn select_owner(tx: &Transaction<'_>, target: &LockTarget) -> rusqlite::Result<Option<Identity>> {
    tx.query_row(SELECT_OWNER, params![target.key()], owner_from_row)
        .optional()
}

fn owner_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    let host: String = row.get(0)?;
    let pid: u32 = row.get(1)?;
    let thread: Option<i64> = row.get(2)?;
    Ok(Identity::new(host, pid, thread.map(|thread| thread as u64)))
}

fn row_failure(target: &LockTarget, err: rusqlite::Error) -> LockError {
    LockError::failed(target, format!("record store error: {err}"))
}

fn store_failure(database: &Path, err: rusqlite::Error) -> LockError {
    LockError::failed(
        database.display(),
        format!("Failed to open lock record store: {err}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(temp: &TempDir) -> (RecordStoreBackend, LockTarget) {
        let backend = RecordStoreBackend::open(temp.path().join("locks.sqlite3")).unwrap();
        let target = LockTarget::new(temp.path().join("data")).unwrap();
        (backend, target)
    }

    #[test]
    fn claim_inserts_a_single_row() {
        let temp = TempDir::new().unwrap();
        let (backend, target) = setup(&temp);
        let owner = Identity::resolve(true);

        assert_eq!(backend.try_claim(&target, &owner).unwrap(), Claim::Acquired);
        let count: i64 = backend
            .connection
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM locks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(backend.current_owner(&target).unwrap(), Some(owner));
    }

    #[test]
    fn duplicate_insert_reports_holder() {
        let temp = TempDir::new().unwrap();
        let (backend, target) = setup(&temp);
        let holder = Identity::new("elsewhere", 9, Some(4));

        backend.try_claim(&target, &holder).unwrap();
        match backend.try_claim(&target, &Identity::resolve(true)).unwrap() {
            Claim::Contended(Some(owner)) => {
                assert_eq!(owner.host(), "elsewhere");
                assert_eq!(owner.thread_id(), Some(4));
            }
            other => panic!("expected contention, got {other:?}"),
        }
    }

    #[test]
    fn separate_connections_share_records() {
        let temp = TempDir::new().unwrap();
        let (first, target) = setup(&temp);
        let second = RecordStoreBackend::open(first.database()).unwrap();
        let owner = Identity::new("box", 1, Some(1));

        first.try_claim(&target, &owner).unwrap();
        assert_eq!(second.current_owner(&target).unwrap(), Some(owner.clone()));
        assert!(matches!(
            second
                .try_claim(&target, &Identity::new("box", 2, Some(1)))
                .unwrap(),
            Claim::Contended(_)
        ));
        second.release(&target, &owner).unwrap();
        assert!(first.current_owner(&target).unwrap().is_none());
    }

    #[test]
    fn release_requires_matching_owner() {
        let temp = TempDir::new().unwrap();
        let (backend, target) = setup(&temp);
        let owner = Identity::new("box", 1, Some(1));

        assert!(matches!(
            backend.release(&target, &owner),
            Err(LockError::NotLocked { .. })
        ));
        backend.try_claim(&target, &owner).unwrap();
        assert!(matches!(
            backend.release(&target, &Identity::new("box", 1, Some(2))),
            Err(LockError::NotMyLock { .. })
        ));
        backend.release(&target, &owner).unwrap();
    }

    #[test]
    fn force_clear_ignores_missing_rows() {
        let temp = TempDir::new().unwrap();
        let (backend, target) = setup(&temp);

        backend.force_clear(&target).unwrap();
        backend
            .try_claim(&target, &Identity::new("box", 1, None))
            .unwrap();
        backend.force_clear(&target).unwrap();
        assert!(backend.current_owner(&target).unwrap().is_none());
    }

    #[test]
    fn unopenable_database_is_a_storage_failure() {
        let temp = TempDir::new().unwrap();
        let err = RecordStoreBackend::open(temp.path().join("missing").join("locks.sqlite3"))
            .unwrap_err();
        assert!(matches!(err, LockError::LockFailed { .. }));
    }
}
