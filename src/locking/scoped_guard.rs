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

use crate::error::Result;
use crate::locking::handle::LockHandle;
use log::warn;

/// RAII guard that releases a held lock when dropped.
pub struct LockGuard<'a> {
    handle: Option<&'a mut LockHandle>,
}

impl<'a> LockGuard<'a> {
    pub(crate) fn new(handle: &'a mut LockHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> Option<&LockHandle> {
        self.handle.as_deref()
    }

    /// Releases now and reports the outcome instead of logging it on drop.
    pub fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.release(),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.release()
        {
            warn!("Failed to release lock on {}: {err}", handle.target());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::backend::BackendKind;
    use std::panic::{self, AssertUnwindSafe};
    use tempfile::TempDir;

    #[test]
    fn guard_drop_allows_reacquire() {
        let temp = TempDir::new().unwrap();
        let mut lock = LockHandle::new(temp.path().join("guarded"), BackendKind::Link).unwrap();
        {
            let guard = lock.lock().unwrap();
            assert_eq!(guard.handle().map(LockHandle::owns_lock), Some(true));
        }
        assert!(!lock.is_locked().unwrap());
        lock.try_acquire().unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn explicit_release_returns_ok() {
        let temp = TempDir::new().unwrap();
        let mut lock =
            LockHandle::new(temp.path().join("guarded"), BackendKind::Directory).unwrap();
        let guard = lock.lock().unwrap();
        guard.release().unwrap();
        assert!(!lock.is_locked().unwrap());
    }

    #[test]
    fn panic_inside_scope_still_releases() {
        let temp = TempDir::new().unwrap();
        let mut lock = LockHandle::new(temp.path().join("guarded"), BackendKind::Link).unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            lock.with_lock(|| -> u32 { panic!("work failed") }).unwrap();
        }));
        assert!(outcome.is_err());
        assert!(!lock.is_locked().unwrap());
    }

    #[test]
    fn release_failure_after_break_is_reported() {
        let temp = TempDir::new().unwrap();
        let mut lock = LockHandle::new(temp.path().join("guarded"), BackendKind::Link).unwrap();
        let mut breaker =
            LockHandle::new(temp.path().join("guarded"), BackendKind::Link).unwrap();

        let guard = lock.lock().unwrap();
        breaker.break_lock().unwrap();
        assert!(guard.release().unwrap_err().is_ownership_mismatch());
    }
}
