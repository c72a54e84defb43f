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

//! Ownership identity stamped into every lock record.
//!
//! An [`Identity`] names the execution context holding a lock: host and
//! process, plus the thread in threaded mode. Handles resolve it once and
//! pass it explicitly to every backend call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Host name recorded when the operating system cannot report one.
pub const UNKNOWN_HOST: &str = "unknown-host";

static HOST_NAME: OnceLock<String> = OnceLock::new();
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Owner of a lock record.
///
/// Equality compares host and process id, and thread id only when both sides
/// carry one. An unthreaded identity therefore matches every thread of the
/// same process. The relation is not transitive, so there is no `Eq` or
/// `Hash` implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    host: String,
    process_id: u32,
    thread_id: Option<u64>,
}

impl Identity {
    pub fn new(host: impl Into<String>, process_id: u32, thread_id: Option<u64>) -> Self {
        Self {
            host: host.into(),
            process_id,
            thread_id,
        }
    }

    /// Identity of the calling context. With `threaded == false` every
    /// thread of this process resolves to the same owner.
    pub fn resolve(threaded: bool) -> Self {
        let thread_id = threaded.then(current_thread_id);
        Self::new(host_name(), std::process::id(), thread_id)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn thread_id(&self) -> Option<u64> {
        self.thread_id
    }

    pub fn is_threaded(&self) -> bool {
        self.thread_id.is_some()
    }

    /// Strict comparison: like `==` but an unthreaded identity only matches
    /// another unthreaded one.
    pub fn matches_exactly(&self, other: &Identity) -> bool {
        self == other && self.thread_id == other.thread_id
    }

    /// Filesystem-safe token used when naming per-owner artifacts.
    pub fn file_token(&self) -> String {
        let host: String = self
            .host
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        match self.thread_id {
            Some(thread) => format!("{host}-{}-{thread}", self.process_id),
            None => format!("{host}-{}", self.process_id),
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        if self.host != other.host || self.process_id != other.process_id {
            return false;
        }
        match (self.thread_id, other.thread_id) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_id {
            Some(thread) => write!(f, "pid {} thread {thread} on {}", self.process_id, self.host),
            None => write!(f, "pid {} on {}", self.process_id, self.host),
        }
    }
}

fn host_name() -> String {
    HOST_NAME
        .get_or_init(|| {
            hostname::get()
                .ok()
                .map(|name| name.to_string_lossy().trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_HOST.to_string())
        })
        .clone()
}

fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
