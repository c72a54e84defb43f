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

use crate::config::LockingConfig;
use crate::error::Result;
use crate::identity::Identity;
use crate::locking::acquisition::{LockAcquisitionRequest, PollingBackoff};
use crate::locking::backend::{BackendKind, LockBackend, open_backend};
use crate::locking::scoped_guard::LockGuard;
use crate::locking::target::LockTarget;
use crate::locking::timeout::LockTimeoutValue;
use crate::locking::wait_observer::LockWaitObserver;
use log::debug;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Client-side handle on a path lock.
///
/// The backend's record is authoritative; `owns_lock` only remembers whether
/// this handle won the last claim. A handle is not reentrant: acquiring twice
/// without a release contends with itself.
pub struct LockHandle {
    target: LockTarget,
    identity: Identity,
    backend: Arc<dyn LockBackend>,
    backoff: PollingBackoff,
    default_timeout: LockTimeoutValue,
    observer: Option<Arc<dyn LockWaitObserver>>,
    owns_lock: bool,
}

impl LockHandle {
    /// Opens a threaded handle on `path` using `kind` with default settings.
    pub fn new<P: AsRef<Path>>(path: P, kind: BackendKind) -> Result<Self> {
        let config = LockingConfig {
            backend: kind,
            ..LockingConfig::default()
        };
        Self::open(path, &config)
    }

    /// Opens a handle configured by `config`. The configured timeout becomes
    /// the budget of [`LockHandle::acquire_default`].
    pub fn open<P: AsRef<Path>>(path: P, config: &LockingConfig) -> Result<Self> {
        let backend = open_backend(config.backend, config)?;
        let handle = Self::with_backend(path, backend, config.threaded)?
            .with_backoff(PollingBackoff::fixed(config.poll_interval()))
            .with_default_timeout(config.timeout_value());
        Ok(handle)
    }

    /// Builds a handle around an existing backend, typically shared between handles.
    pub fn with_backend<P: AsRef<Path>>(
        path: P,
        backend: Arc<dyn LockBackend>,
        threaded: bool,
    ) -> Result<Self> {
        let target = LockTarget::new(path)?;
        Ok(Self {
            target,
            identity: Identity::resolve(threaded),
            backend,
            backoff: PollingBackoff::default(),
            default_timeout: LockTimeoutValue::default(),
            observer: None,
            owns_lock: false,
        })
    }

    pub fn with_backoff(mut self, backoff: PollingBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_default_timeout(mut self, timeout: LockTimeoutValue) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LockWaitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn target(&self) -> &LockTarget {
        &self.target
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn default_timeout(&self) -> LockTimeoutValue {
        self.default_timeout
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Whether this handle won the most recent claim. Not authoritative.
    pub fn owns_lock(&self) -> bool {
        self.owns_lock
    }

    /// Claims the lock within `timeout`.
    ///
    /// `Infinite` blocks until the claim succeeds. `NoWait` and a zero
    /// duration make one attempt and fail with `AlreadyLocked`. A positive
    /// duration polls and fails with `LockTimeout` once it has elapsed.
    pub fn acquire(&mut self, timeout: impl Into<LockTimeoutValue>) -> Result<()> {
        let timeout = timeout.into();
        debug!(
            "Acquiring {} lock on {} as {} (timeout {timeout})",
            self.backend.kind(),
            self.target,
            self.identity
        );

        LockAcquisitionRequest::new(&self.target, &self.identity, timeout)
            .with_backoff(self.backoff.clone())
            .with_observer(self.observer.as_deref())
            .run(|target, owner| self.backend.try_claim(target, owner))?;

        self.owns_lock = true;
        Ok(())
    }

    /// Claims the lock within the timeout this handle was configured with.
    pub fn acquire_default(&mut self) -> Result<()> {
        self.acquire(self.default_timeout)
    }

    /// Single non-blocking attempt.
    pub fn try_acquire(&mut self) -> Result<()> {
        self.acquire(LockTimeoutValue::NoWait)
    }

    pub fn release(&mut self) -> Result<()> {
        self.backend.release(&self.target, &self.identity)?;
        self.owns_lock = false;
        debug!("Released lock on {}", self.target);
        Ok(())
    }

    /// True when a lock record exists, whoever holds it.
    pub fn is_locked(&self) -> Result<bool> {
        self.backend.is_held(&self.target)
    }

    /// True when this handle claimed the lock and the record still carries
    /// exactly this handle's identity.
    pub fn am_owner(&self) -> Result<bool> {
        if !self.owns_lock {
            return Ok(false);
        }
        let owner = self.backend.current_owner(&self.target)?;
        Ok(owner.is_some_and(|owner| owner.matches_exactly(&self.identity)))
    }

    /// Current owner of the lock record, if any.
    pub fn owner(&self) -> Result<Option<Identity>> {
        self.backend.current_owner(&self.target)
    }

    /// Removes the lock record regardless of who holds it.
    pub fn break_lock(&mut self) -> Result<()> {
        self.owns_lock = false;
        self.backend.force_clear(&self.target)?;
        debug!("Broke lock on {}", self.target);
        Ok(())
    }

    /// Blocks until the lock is held and returns a guard releasing it on drop.
    pub fn lock(&mut self) -> Result<LockGuard<'_>> {
        self.acquire(LockTimeoutValue::Infinite)?;
        Ok(LockGuard::new(self))
    }

    /// Runs `work` while holding the lock. The lock is released on every exit,
    /// including a panic inside `work`.
    pub fn with_lock<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        let guard = self.lock()?;
        let output = work();
        guard.release()?;
        Ok(output)
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("target", &self.target)
            .field("identity", &self.identity)
            .field("backend", &self.backend.kind())
            .field("default_timeout", &self.default_timeout)
            .field("owns_lock", &self.owns_lock)
            .finish()
    }
}
