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

//! Storage strategies implementing the atomic claim/release primitive.
//!
//! Every backend guarantees that at most one lock record exists per target.
//! Exclusivity comes from a single atomic storage operation (`link(2)`,
//! `mkdir(2)`, or a unique-key insert); callers never read-then-write.

pub mod directory;
pub mod link;
pub mod record_store;

pub use directory::DirectoryBackend;
pub use link::LinkBackend;
pub use record_store::RecordStoreBackend;

use crate::config::LockingConfig;
use crate::error::{LockError, Result};
use crate::identity::Identity;
use crate::locking::target::LockTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Selects one of the interchangeable storage strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Link,
    Directory,
    RecordStore,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Link,
        BackendKind::Directory,
        BackendKind::RecordStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Link => "link",
            BackendKind::Directory => "directory",
            BackendKind::RecordStore => "record_store",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = LockError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "link" => Ok(BackendKind::Link),
            "directory" | "mkdir" => Ok(BackendKind::Directory),
            "record_store" | "sqlite" => Ok(BackendKind::RecordStore),
            other => Err(LockError::ConfigError(format!(
                "Unknown lock backend '{other}'. Expected link, directory, or record_store."
            ))),
        }
    }
}

/// Outcome of a single claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Acquired,
    /// A record already exists; carries its owner when it could be read.
    Contended(Option<Identity>),
}

/// Atomic storage operations shared by every strategy.
pub trait LockBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Creates the lock record stamped with `owner` iff none exists.
    fn try_claim(&self, target: &LockTarget, owner: &Identity) -> Result<Claim>;

    /// Removes the record iff it exists and is stamped with `owner`.
    /// Fails with `NotLocked` or `NotMyLock` otherwise.
    fn release(&self, target: &LockTarget, owner: &Identity) -> Result<()>;

    /// Non-destructive read of the current owner.
    fn current_owner(&self, target: &LockTarget) -> Result<Option<Identity>>;

    /// Whether a lock record exists. Backends whose record can exist before
    /// its owner is readable override this.
    fn is_held(&self, target: &LockTarget) -> Result<bool> {
        Ok(self.current_owner(target)?.is_some())
    }

    /// Removes the record regardless of owner. A missing record is not an error.
    fn force_clear(&self, target: &LockTarget) -> Result<()>;
}

/// Builds the backend selected by `kind`.
pub fn open_backend(kind: BackendKind, config: &LockingConfig) -> Result<Arc<dyn LockBackend>> {
    let backend: Arc<dyn LockBackend> = match kind {
        BackendKind::Link => Arc::new(LinkBackend::new()),
        BackendKind::Directory => Arc::new(DirectoryBackend::new()),
        BackendKind::RecordStore => Arc::new(RecordStoreBackend::open(config.database_path())?),
    };
    Ok(backend)
}
