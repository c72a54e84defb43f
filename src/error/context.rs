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

use crate::error::LockError;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a LockError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a LockError) -> Self {
        let (suggestion, details) = match error {
            LockError::AlreadyLocked { owner, .. } => {
                let suggestion = Some(
                    "Retry with a timeout, or call break_lock() if the holder is known to have \
                     exited."
                        .to_string(),
                );
                let details = owner
                    .as_ref()
                    .map(|identity| format!("Current holder: {identity}"));
                (suggestion, details)
            }
            LockError::LockTimeout {
                waited_secs,
                timeout_value,
                ..
            } => {
                let suggestion = Some(
                    "Increase the timeout passed to acquire(), or PATHLOCK_TIMEOUT / the \
                     `timeout` config key used by acquire_default()."
                        .to_string(),
                );
                let details = Some(format!(
                    "Waited {waited_secs:.3}s against a budget of {timeout_value}"
                ));
                (suggestion, details)
            }
            LockError::NotLocked { .. } => {
                let suggestion = Some(
                    "The lock was already released or broken by another party; do not release \
                     it twice."
                        .to_string(),
                );
                (suggestion, None)
            }
            LockError::NotMyLock { owner, .. } => {
                let suggestion = Some(
                    "Only the owner may release this lock. Use break_lock() to forcibly clear it."
                        .to_string(),
                );
                let details = owner.as_ref().map(|identity| format!("Owned by: {identity}"));
                (suggestion, details)
            }
            LockError::LockFailed { details, .. } => {
                let suggestion = Some(
                    "Check that the parent directory exists and is writable."
                        .to_string(),
                );
                (suggestion, Some(details.clone()))
            }
            LockError::ConfigError(_) | LockError::InvalidTimeout(_) => {
                let suggestion = Some("Review pathlock.toml and PATHLOCK_* variables.".to_string());
                (suggestion, None)
            }
            LockError::Io(err) => {
                let details = Some(format!("I/O error kind: {:?}", err.kind()));
                (None, details)
            }
        };

        Self {
            error,
            suggestion,
            details,
        }
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    /// Whether retrying the same operation later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        self.error.is_contention()
    }
}

impl fmt::Display for ErrorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
