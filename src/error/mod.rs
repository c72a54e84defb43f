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

mod context;

pub use context::ErrorContext;

use crate::identity::Identity;
use crate::locking::timeout::{LockTimeoutParseError, LockTimeoutValue};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("{target} is already locked by {}", describe_owner(.owner))]
    AlreadyLocked {
        target: String,
        owner: Option<Identity>,
    },

    #[error("Timed out after {waited_secs:.3}s waiting for lock on {target} (timeout {timeout_value})")]
    LockTimeout {
        target: String,
        waited_secs: f64,
        timeout_value: LockTimeoutValue,
    },

    #[error("{target} is not locked")]
    NotLocked { target: String },

    #[error("{target} is locked by {}, not by this owner", describe_owner(.owner))]
    NotMyLock {
        target: String,
        owner: Option<Identity>,
    },

    #[error("Lock storage failure for {target}: {details}")]
    LockFailed { target: String, details: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    InvalidTimeout(#[from] LockTimeoutParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LockError {
    pub(crate) fn failed(target: impl ToString, details: impl ToString) -> Self {
        LockError::LockFailed {
            target: target.to_string(),
            details: details.to_string(),
        }
    }

    /// True when the lock could not be obtained because somebody else holds it.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            LockError::AlreadyLocked { .. } | LockError::LockTimeout { .. }
        )
    }

    /// True when the stored lock state disagrees with what the caller expected.
    pub fn is_ownership_mismatch(&self) -> bool {
        matches!(
            self,
            LockError::NotLocked { .. } | LockError::NotMyLock { .. }
        )
    }

    /// Owner reported by contention or mismatch errors, if one was discoverable.
    pub fn owner(&self) -> Option<&Identity> {
        match self {
            LockError::AlreadyLocked { owner, .. } | LockError::NotMyLock { owner, .. } => {
                owner.as_ref()
            }
            _ => None,
        }
    }
}

fn describe_owner(owner: &Option<Identity>) -> String {
    match owner {
        Some(identity) => identity.to_string(),
        None => "an unknown owner".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
