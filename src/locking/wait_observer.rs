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

//! Observer interfaces for lock wait instrumentation.
//!
//! Observers decouple the poll loop from whatever feedback a caller wants to
//! surface while waiting on a contended lock.

use crate::locking::target::LockTarget;
use crate::locking::timeout::LockTimeoutValue;
use log::{debug, info, warn};
use std::time::Duration;

/// Observer hooks for lock wait events.
pub trait LockWaitObserver: Send + Sync {
    fn on_wait_start(&self, _target: &LockTarget, _timeout: LockTimeoutValue) {}

    fn on_retry(
        &self,
        _target: &LockTarget,
        _attempt: usize,
        _elapsed: Duration,
        _remaining: Option<Duration>,
    ) {
    }

    fn on_acquired(&self, _target: &LockTarget, _waited: Duration) {}

    fn on_timeout(&self, _target: &LockTarget, _waited: Duration) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopLockWaitObserver;

impl LockWaitObserver for NoopLockWaitObserver {}

/// Observer that reports wait progress through the `log` facade.
#[derive(Debug, Clone)]
pub struct LoggingWaitObserver {
    report_every: usize,
}

impl LoggingWaitObserver {
    /// Logs every `report_every`-th retry at debug level.
    pub fn new(report_every: usize) -> Self {
        Self {
            report_every: report_every.max(1),
        }
    }
}

impl Default for LoggingWaitObserver {
    fn default() -> Self {
        Self::new(50)
    }
}

impl LockWaitObserver for LoggingWaitObserver {
    fn on_wait_start(&self, target: &LockTarget, timeout: LockTimeoutValue) {
        info!("Waiting for lock on {target} (timeout {timeout})");
    }

    fn on_retry(
        &self,
        target: &LockTarget,
        attempt: usize,
        elapsed: Duration,
        remaining: Option<Duration>,
    ) {
        if attempt % self.report_every != 0 {
            return;
        }
        match remaining {
            Some(remaining) => debug!(
                "Still waiting for {target}: attempt {attempt}, {:.1}s elapsed, {:.1}s left",
                elapsed.as_secs_f64(),
                remaining.as_secs_f64()
            ),
            None => debug!(
                "Still waiting for {target}: attempt {attempt}, {:.1}s elapsed",
                elapsed.as_secs_f64()
            ),
        }
    }

    fn on_acquired(&self, target: &LockTarget, waited: Duration) {
        debug!(
            "Lock on {target} granted after {:.3}s",
            waited.as_secs_f64()
        );
    }

    fn on_timeout(&self, target: &LockTarget, waited: Duration) {
        warn!(
            "Gave up waiting for {target} after {:.3}s",
            waited.as_secs_f64()
        );
    }
}
