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

//! Locking based on atomic directory creation.
//!
//! `mkdir(2)` fails when the directory already exists, so creating
//! `<path>.lock/` is the claim. The owner stamp is staged inside the new
//! directory and renamed to [`OWNER_FILE`] so readers never observe a
//! partially written stamp.

use crate::error::{LockError, Result};
use crate::identity::Identity;
use crate::locking::backend::{BackendKind, Claim, LockBackend};
use crate::locking::stamp;
use crate::locking::target::LockTarget;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of the owner stamp inside the lock directory.
pub const OWNER_FILE: &str = "owner.json";

#[derive(Debug, Default)]
pub struct DirectoryBackend;

impl DirectoryBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LockBackend for DirectoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Directory
    }

    fn try_claim(&self, target: &LockTarget, owner: &Identity) -> Result<Claim> {
        let lock_dir = target.lock_path();
        match fs::create_dir(lock_dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_owner(lock_dir).ok().flatten();
                return Ok(Claim::Contended(holder));
            }
            Err(err) => {
                return Err(LockError::failed(
                    target,
                    format!("Failed to create {}: {err}", lock_dir.display()),
                ));
            }
        }

        if let Err(err) = write_owner(lock_dir, owner) {
            if let Err(cleanup) = fs::remove_dir_all(lock_dir) {
                warn!(
                    "Failed to remove lock directory {} after stamp failure: {cleanup}",
                    lock_dir.display()
                );
            }
            return Err(LockError::failed(
                target,
                format!("Failed to stamp {}: {err}", lock_dir.display()),
            ));
        }

        debug!("Claimed directory lock {} for {owner}", lock_dir.display());
        Ok(Claim::Acquired)
    }

    fn release(&self, target: &LockTarget, owner: &Identity) -> Result<()> {
        let lock_dir = target.lock_path();
        if !lock_dir.is_dir() {
            return Err(LockError::NotLocked {
                target: target.label(),
            });
        }

        let holder = read_owner(lock_dir).map_err(|err| {
            LockError::failed(
                target,
                format!("Failed to read owner of {}: {err}", lock_dir.display()),
            )
        })?;
        match holder {
            Some(holder) if holder == *owner => {}
            other => {
                return Err(LockError::NotMyLock {
                    target: target.label(),
                    owner: other,
                });
            }
        }

        match fs::remove_file(owner_path(lock_dir)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LockError::NotLocked {
                    target: target.label(),
                });
            }
            Err(err) => {
                return Err(LockError::failed(
                    target,
                    format!("Failed to remove owner stamp: {err}"),
                ));
            }
        }

        match fs::remove_dir(lock_dir) {
            Ok(()) => {
                debug!("Released directory lock {}", lock_dir.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(LockError::NotLocked {
                target: target.label(),
            }),
            Err(err) => Err(LockError::failed(
                target,
                format!("Failed to remove {}: {err}", lock_dir.display()),
            )),
        }
    }

    fn current_owner(&self, target: &LockTarget) -> Result<Option<Identity>> {
        read_owner(target.lock_path()).map_err(|err| {
            LockError::failed(
                target,
                format!(
                    "Failed to read owner of {}: {err}",
                    target.lock_path().display()
                ),
            )
        })
    }

    /// The directory itself is the record, stamped or not.
    fn is_held(&self, target: &LockTarget) -> Result<bool> {
        let lock_dir = target.lock_path();
        match fs::metadata(lock_dir) {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(LockError::failed(
                target,
                format!("Failed to inspect {}: {err}", lock_dir.display()),
            )),
        }
    }

    fn force_clear(&self, target: &LockTarget) -> Result<()> {
        let lock_dir = target.lock_path();
        match fs::remove_dir_all(lock_dir) {
            Ok(()) => {
                debug!("Broke directory lock {}", lock_dir.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LockError::failed(
                target,
                format!("Failed to remove {}: {err}", lock_dir.display()),
            )),
        }
    }
}

fn owner_path(lock_dir: &Path) -> PathBuf {
    lock_dir.join(OWNER_FILE)
}

fn write_owner(lock_dir: &Path, owner: &Identity) -> io::Result<()> {
    let staging = lock_dir.join(format!(".{}-{}", owner.file_token(), Uuid::new_v4()));
    stamp::write_new(&staging, owner)?;
    fs::rename(&staging, owner_path(lock_dir))
}

fn read_owner(lock_dir: &Path) -> io::Result<Option<Identity>> {
    Ok(stamp::read(&owner_path(lock_dir))?.map(|stamp| stamp.identity()))
}
