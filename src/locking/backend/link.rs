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

//! Locking based on atomic hard-link creation.
//!
//! A claim writes the owner stamp into a uniquely named staging file next to
//! the target and then hard-links it to `<path>.lock`. `link(2)` refuses to
//! replace an existing destination, which makes the claim atomic even on
//! network filesystems that do not honour exclusive create. The staging file
//! is removed afterwards, leaving `<path>.lock` as the lock record.

use crate::error::{LockError, Result};
use crate::identity::Identity;
use crate::locking::backend::{BackendKind, Claim, LockBackend};
use crate::locking::stamp;
use crate::locking::target::{LockTarget, append_suffix};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Substring used for staging artifacts while attempting a claim.
pub(crate) const STAGING_SEGMENT: &str = ".staging-";

#[derive(Debug, Default)]
pub struct LinkBackend;

impl LinkBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LockBackend for LinkBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Link
    }

    fn try_claim(&self, target: &LockTarget, owner: &Identity) -> Result<Claim> {
        let lock_path = target.lock_path();
        let staging = staging_path(lock_path, owner);

        stamp::write_new(&staging, owner).map_err(|err| {
            cleanup_staging(&staging);
            LockError::failed(
                target,
                format!("Failed to write staging file {}: {err}", staging.display()),
            )
        })?;

        let outcome = link_outcome(target, &staging, fs::hard_link(&staging, lock_path));

        cleanup_staging(&staging);
        if matches!(outcome, Ok(Claim::Acquired)) {
            debug!("Claimed link lock {} for {owner}", lock_path.display());
        }
        outcome
    }

    fn release(&self, target: &LockTarget, owner: &Identity) -> Result<()> {
        let lock_path = target.lock_path();
        let holder = read_owner(lock_path).map_err(|err| {
            LockError::failed(
                target,
                format!("Failed to read {}: {err}", lock_path.display()),
            )
        })?;

        match holder {
            None => Err(LockError::NotLocked {
                target: target.label(),
            }),
            Some(holder) if holder != *owner => Err(LockError::NotMyLock {
                target: target.label(),
                owner: Some(holder),
            }),
            Some(_) => match fs::remove_file(lock_path) {
                Ok(()) => {
                    debug!("Released link lock {}", lock_path.display());
                    Ok(())
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => Err(LockError::NotLocked {
                    target: target.label(),
                }),
                Err(err) => Err(LockError::failed(
                    target,
                    format!("Failed to remove {}: {err}", lock_path.display()),
                )),
            },
        }
    }

    fn current_owner(&self, target: &LockTarget) -> Result<Option<Identity>> {
        read_owner(target.lock_path()).map_err(|err| {
            LockError::failed(
                target,
                format!("Failed to read {}: {err}", target.lock_path().display()),
            )
        })
    }

    /// The link is the record even when its stamp cannot be decoded.
    fn is_held(&self, target: &LockTarget) -> Result<bool> {
        let lock_path = target.lock_path();
        match fs::symlink_metadata(lock_path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(LockError::failed(
                target,
                format!("Failed to inspect {}: {err}", lock_path.display()),
            )),
        }
    }

    fn force_clear(&self, target: &LockTarget) -> Result<()> {
        let lock_path = target.lock_path();
        match fs::remove_file(lock_path) {
            Ok(()) => {
                debug!("Broke link lock {}", lock_path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LockError::failed(
                target,
                format!("Failed to remove {}: {err}", lock_path.display()),
            )),
        }
    }
}

/// Maps the result of `link(staging, <path>.lock)` to a claim outcome.
fn link_outcome(target: &LockTarget, staging: &Path, linked: io::Result<()>) -> Result<Claim> {
    let lock_path = target.lock_path();
    match linked {
        Ok(()) => Ok(Claim::Acquired),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            let holder = read_owner(lock_path).ok().flatten();
            Ok(Claim::Contended(holder))
        }
        Err(err) if link_count(staging) == Some(2) => {
            // The server applied the link even though the reply was lost.
            debug!(
                "link() for {} reported {err} but the staging file is linked; treating as claimed",
                lock_path.display()
            );
            Ok(Claim::Acquired)
        }
        Err(err) => Err(LockError::failed(
            target,
            format!("Failed to link {}: {err}", lock_path.display()),
        )),
    }
}

fn read_owner(lock_path: &Path) -> io::Result<Option<Identity>> {
    Ok(stamp::read(lock_path)?.map(|stamp| stamp.identity()))
}

fn staging_path(lock_path: &Path, owner: &Identity) -> PathBuf {
    let suffix = format!("{STAGING_SEGMENT}{}-{}", owner.file_token(), Uuid::new_v4());
    append_suffix(lock_path, &suffix)
}

fn cleanup_staging(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        match err.kind() {
            io::ErrorKind::NotFound => {}
            _ => warn!("Failed to remove staging file {}: {err}", path.display()),
        }
    }
}

#[cfg(unix)]
fn link_count(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|metadata| metadata.nlink())
}

#[cfg(not(unix))]
fn link_count(_path: &Path) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target_in(temp: &TempDir) -> LockTarget {
        LockTarget::new(temp.path().join("data")).unwrap()
    }

    fn entries(temp: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn claim_leaves_only_the_lock_link() {
        let temp = TempDir::new().unwrap();
        let target = target_in(&temp);
        let owner = Identity::resolve(true);
        let backend = LinkBackend::new();

        assert_eq!(backend.try_claim(&target, &owner).unwrap(), Claim::Acquired);
        assert_eq!(entries(&temp), vec!["data.lock".to_string()]);
        assert_eq!(backend.current_owner(&target).unwrap(), Some(owner));
    }

    #[test]
    fn second_claim_reports_holder_and_cleans_staging() {
        let temp = TempDir::new().unwrap();
        let target = target_in(&temp);
        let holder = Identity::new("elsewhere", 1, Some(1));
        let backend = LinkBackend::new();

        backend.try_claim(&target, &holder).unwrap();
        let outcome = backend
            .try_claim(&target, &Identity::resolve(true))
            .unwrap();

        match outcome {
            Claim::Contended(Some(owner)) => assert_eq!(owner.host(), "elsewhere"),
            other => panic!("expected contention, got {other:?}"),
        }
        assert_eq!(entries(&temp), vec!["data.lock".to_string()]);
    }

    #[test]
    fn release_checks_owner() {
        let temp = TempDir::new().unwrap();
        let target = target_in(&temp);
        let owner = Identity::new("box", 10, Some(1));
        let backend = LinkBackend::new();

        assert!(matches!(
            backend.release(&target, &owner),
            Err(LockError::NotLocked { .. })
        ));

        backend.try_claim(&target, &owner).unwrap();
        let stranger = Identity::new("box", 11, Some(1));
        assert!(matches!(
            backend.release(&target, &stranger),
            Err(LockError::NotMyLock { .. })
        ));

        backend.release(&target, &owner).unwrap();
        assert!(!target.lock_path().exists());
    }

    #[test]
    fn force_clear_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let target = target_in(&temp);
        let backend = LinkBackend::new();

        backend.force_clear(&target).unwrap();
        backend
            .try_claim(&target, &Identity::new("box", 1, None))
            .unwrap();
        backend.force_clear(&target).unwrap();
        assert!(backend.current_owner(&target).unwrap().is_none());
        backend.force_clear(&target).unwrap();
    }

    #[test]
    fn missing_parent_is_a_storage_failure() {
        let temp = TempDir::new().unwrap();
        let target = LockTarget::new(temp.path().join("missing").join("data")).unwrap();
        let err = LinkBackend::new()
            .try_claim(&target, &Identity::resolve(true))
            .unwrap_err();
        assert!(matches!(err, LockError::LockFailed { .. }));
    }

    #[test]
    fn undecodable_record_is_contention_with_unknown_owner() {
        let temp = TempDir::new().unwrap();
        let target = target_in(&temp);
        fs::write(target.lock_path(), b"not an owner stamp").unwrap();
        let backend = LinkBackend::new();

        assert_eq!(
            backend
                .try_claim(&target, &Identity::resolve(true))
                .unwrap(),
            Claim::Contended(None)
        );
        assert!(matches!(
            backend.current_owner(&target),
            Err(LockError::LockFailed { .. })
        ));
        assert!(backend.is_held(&target).unwrap());
        assert_eq!(entries(&temp), vec!["data.lock".to_string()]);

        backend.force_clear(&target).unwrap();
        assert!(!backend.is_held(&target).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn link_error_with_linked_staging_counts_as_claimed() {
        let temp = TempDir::new().unwrap();
        let target = target_in(&temp);
        let owner = Identity::resolve(true);
        let staging = staging_path(target.lock_path(), &owner);
        stamp::write_new(&staging, &owner).unwrap();

        let lost_reply = || io::Error::new(io::ErrorKind::TimedOut, "reply lost");
        let err = link_outcome(&target, &staging, Err(lost_reply())).unwrap_err();
        assert!(matches!(err, LockError::LockFailed { .. }));

        fs::hard_link(&staging, target.lock_path()).unwrap();
        assert_eq!(
            link_outcome(&target, &staging, Err(lost_reply())).unwrap(),
            Claim::Acquired
        );
        cleanup_staging(&staging);
        assert_eq!(
            LinkBackend::new().current_owner(&target).unwrap(),
            Some(owner)
        );
    }
}
