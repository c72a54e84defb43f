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

use crate::error::{LockError, Result};
use crate::identity::Identity;
use crate::locking::backend::Claim;
use crate::locking::target::LockTarget;
use crate::locking::timeout::LockTimeoutValue;
use crate::locking::wait_observer::LockWaitObserver;
use log::debug;
use std::thread;
use std::time::{Duration, Instant};

/// Default pause between claim attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pause between claim attempts while polling for a contended lock.
#[derive(Debug, Clone)]
pub struct PollingBackoff {
    interval: Duration,
}

impl PollingBackoff {
    pub fn fixed(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn next_delay(&self) -> Duration {
        self.interval
    }
}

impl Default for PollingBackoff {
    fn default() -> Self {
        Self::fixed(DEFAULT_POLL_INTERVAL)
    }
}

/// Tracks elapsed and remaining time against a monotonic start instant.
#[derive(Debug, Clone)]
pub struct LockTimeoutBudget {
    value: LockTimeoutValue,
    started_at: Instant,
}

impl LockTimeoutBudget {
    pub fn new(value: LockTimeoutValue) -> Self {
        Self {
            value,
            started_at: Instant::now(),
        }
    }

    pub fn value(&self) -> LockTimeoutValue {
        self.value
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self.value {
            LockTimeoutValue::Infinite => None,
            LockTimeoutValue::NoWait => Some(Duration::ZERO),
            LockTimeoutValue::Finite(limit) => Some(limit.saturating_sub(self.elapsed())),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.value {
            LockTimeoutValue::Infinite => false,
            LockTimeoutValue::NoWait => true,
            LockTimeoutValue::Finite(limit) => self.elapsed() >= limit,
        }
    }
}

/// Carries the configuration for a single `acquire` call.
pub struct LockAcquisitionRequest<'a> {
    target: &'a LockTarget,
    owner: &'a Identity,
    budget: LockTimeoutBudget,
    backoff: PollingBackoff,
    observer: Option<&'a dyn LockWaitObserver>,
    retries: usize,
    wait_started: bool,
}

impl<'a> LockAcquisitionRequest<'a> {
    pub fn new(target: &'a LockTarget, owner: &'a Identity, timeout: LockTimeoutValue) -> Self {
        Self {
            target,
            owner,
            budget: LockTimeoutBudget::new(timeout),
            backoff: PollingBackoff::default(),
            observer: None,
            retries: 0,
            wait_started: false,
        }
    }

    pub fn with_backoff(mut self, backoff: PollingBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn LockWaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.elapsed()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.budget.remaining()
    }

    pub fn timeout_value(&self) -> LockTimeoutValue {
        self.budget.value()
    }

    /// Next pause, clamped to the remaining budget. `None` once the budget is spent.
    pub fn next_sleep_interval(&mut self) -> Option<Duration> {
        let remaining = self.remaining();
        let mut delay = self.backoff.next_delay();
        if let Some(remaining_budget) = remaining {
            if remaining_budget < delay {
                delay = remaining_budget;
            }
            if delay.is_zero() {
                return None;
            }
        }
        Some(delay)
    }

    pub fn record_wait_start(&mut self) {
        if !self.wait_started {
            if let Some(observer) = self.observer {
                observer.on_wait_start(self.target, self.timeout_value());
            }
            self.wait_started = true;
        }
    }

    pub fn record_retry(&mut self) {
        self.retries = self.retries.saturating_add(1);
        if let Some(observer) = self.observer {
            observer.on_retry(self.target, self.retries, self.elapsed(), self.remaining());
        }
    }

    pub fn notify_acquired(&self) {
        if let Some(observer) = self.observer {
            observer.on_acquired(self.target, self.elapsed());
        }
    }

    pub fn notify_timeout(&self) {
        if let Some(observer) = self.observer {
            observer.on_timeout(self.target, self.elapsed());
        }
    }

    /// Runs the poll loop, calling `attempt` until it claims the lock or the
    /// budget is exhausted. Storage errors from `attempt` end the loop at once.
    pub fn run<F>(mut self, mut attempt: F) -> Result<()>
    where
        F: FnMut(&LockTarget, &Identity) -> Result<Claim>,
    {
        loop {
            let holder = match attempt(self.target, self.owner)? {
                Claim::Acquired => {
                    debug!(
                        "Acquired lock for {} after {:.3}s ({} retries)",
                        self.target,
                        self.elapsed().as_secs_f64(),
                        self.retries
                    );
                    self.notify_acquired();
                    return Ok(());
                }
                Claim::Contended(holder) => holder,
            };

            if self.timeout_value().is_single_attempt() {
                return Err(LockError::AlreadyLocked {
                    target: self.target.label(),
                    owner: holder,
                });
            }

            self.record_wait_start();
            let sleep_for = if self.budget.is_expired() {
                None
            } else {
                self.next_sleep_interval()
            };

            match sleep_for {
                Some(delay) => {
                    self.record_retry();
                    thread::sleep(delay);
                }
                None => {
                    self.notify_timeout();
                    return Err(LockError::LockTimeout {
                        target: self.target.label(),
                        waited_secs: self.elapsed().as_secs_f64(),
                        timeout_value: self.timeout_value(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::target::LockTarget;
    use std::cell::Cell;
    use std::sync::Mutex;

    fn fixture() -> (LockTarget, Identity) {
        (
            LockTarget::new("/tmp/pathlock-acquisition-test").unwrap(),
            Identity::new("box", 1, Some(1)),
        )
    }

    #[test]
    fn default_backoff_is_fixed() {
        let backoff = PollingBackoff::default();
        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), DEFAULT_POLL_INTERVAL);
        }
    }

    #[test]
    fn sleep_interval_is_clamped_to_budget() {
        let (target, owner) = fixture();
        let mut request =
            LockAcquisitionRequest::new(&target, &owner, LockTimeoutValue::from_millis(5))
                .with_backoff(PollingBackoff::fixed(Duration::from_secs(1)));
        let delay = request.next_sleep_interval().unwrap();
        assert!(delay <= Duration::from_millis(5));
    }

    #[test]
    fn budget_expiry() {
        assert!(LockTimeoutBudget::new(LockTimeoutValue::NoWait).is_expired());
        assert!(!LockTimeoutBudget::new(LockTimeoutValue::Infinite).is_expired());
        let budget = LockTimeoutBudget::new(LockTimeoutValue::from_millis(10));
        thread::sleep(Duration::from_millis(20));
        assert!(budget.is_expired());
        assert_eq!(budget.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn single_attempt_reports_already_locked() {
        let (target, owner) = fixture();
        for timeout in [LockTimeoutValue::NoWait, LockTimeoutValue::from_secs(0)] {
            let calls = Cell::new(0);
            let err = LockAcquisitionRequest::new(&target, &owner, timeout)
                .run(|_, _| {
                    calls.set(calls.get() + 1);
                    Ok(Claim::Contended(None))
                })
                .unwrap_err();
            assert!(matches!(err, LockError::AlreadyLocked { .. }));
            assert_eq!(calls.get(), 1);
        }
    }

    #[test]
    fn positive_timeout_reports_lock_timeout_after_budget() {
        let (target, owner) = fixture();
        let started = Instant::now();
        let err = LockAcquisitionRequest::new(&target, &owner, LockTimeoutValue::from_millis(100))
            .with_backoff(PollingBackoff::fixed(Duration::from_millis(10)))
            .run(|_, _| Ok(Claim::Contended(None)))
            .unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, LockError::LockTimeout { .. }));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(600));
    }

    #[test]
    fn retries_until_claim_succeeds() {
        let (target, owner) = fixture();
        let calls = Cell::new(0);
        LockAcquisitionRequest::new(&target, &owner, LockTimeoutValue::Infinite)
            .with_backoff(PollingBackoff::fixed(Duration::from_millis(1)))
            .run(|_, _| {
                calls.set(calls.get() + 1);
                if calls.get() < 4 {
                    Ok(Claim::Contended(None))
                } else {
                    Ok(Claim::Acquired)
                }
            })
            .unwrap();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn storage_errors_are_not_retried() {
        let (target, owner) = fixture();
        let calls = Cell::new(0);
        let err = LockAcquisitionRequest::new(&target, &owner, LockTimeoutValue::Infinite)
            .run(|target, _| {
                calls.set(calls.get() + 1);
                Err(LockError::failed(target, "disk full"))
            })
            .unwrap_err();
        assert!(matches!(err, LockError::LockFailed { .. }));
        assert_eq!(calls.get(), 1);
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl LockWaitObserver for RecordingObserver {
        fn on_wait_start(&self, _target: &LockTarget, timeout: LockTimeoutValue) {
            self.events.lock().unwrap().push(format!("start:{timeout}"));
        }

        fn on_retry(
            &self,
            _target: &LockTarget,
            attempt: usize,
            _elapsed: Duration,
            _remaining: Option<Duration>,
        ) {
            self.events.lock().unwrap().push(format!("retry:{attempt}"));
        }

        fn on_acquired(&self, _target: &LockTarget, _waited: Duration) {
            self.events.lock().unwrap().push("acquired".to_string());
        }
    }

    #[test]
    fn request_notifies_observer() {
        let (target, owner) = fixture();
        let observer = RecordingObserver::default();
        let calls = Cell::new(0);
        LockAcquisitionRequest::new(&target, &owner, LockTimeoutValue::from_secs(5))
            .with_backoff(PollingBackoff::fixed(Duration::from_millis(1)))
            .with_observer(Some(&observer))
            .run(|_, _| {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Ok(Claim::Contended(None))
                } else {
                    Ok(Claim::Acquired)
                }
            })
            .unwrap();

        let events = observer.events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            ["start:5s", "retry:1", "retry:2", "acquired"]
        );
    }
}
