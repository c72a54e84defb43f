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

//! Advisory, cross-process locks anchored to filesystem paths.
//!
//! A [`LockHandle`] protects a path `P` by creating a lock record next to
//! it. Three interchangeable backends provide the atomic claim: a hard link
//! named `P.lock`, a directory named `P.lock/`, or a row in a SQLite
//! database keyed by `P`.
//!
//! ```no_run
//! use pathlock::{BackendKind, LockHandle, LockTimeoutValue};
//!
//! # fn main() -> pathlock::Result<()> {
//! let mut lock = LockHandle::new("/srv/shared/index.db", BackendKind::Link)?;
//! lock.acquire(LockTimeoutValue::from_secs(5))?;
//! // ... mutate the protected resource ...
//! lock.release()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod locking;
pub mod logging;

pub use config::LockingConfig;
pub use error::{LockError, Result};
pub use identity::Identity;
pub use locking::{BackendKind, LockGuard, LockHandle, LockTarget, LockTimeoutValue};
