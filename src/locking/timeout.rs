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

use std::fmt;
use std::time::Duration;

/// Timeout budget for a single `acquire` call.
///
/// `NoWait` and `Finite(Duration::ZERO)` both make exactly one claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeoutValue {
    #[default]
    Infinite,
    NoWait,
    Finite(Duration),
}

impl LockTimeoutValue {
    pub const fn from_secs(seconds: u64) -> Self {
        Self::Finite(Duration::from_secs(seconds))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::Finite(Duration::from_millis(millis))
    }

    /// Maps a signed number of seconds: negative values mean "do not wait",
    /// values too large for a `Duration` mean "wait forever".
    pub fn from_secs_f64(seconds: f64) -> Self {
        if seconds < 0.0 {
            return Self::NoWait;
        }
        match Duration::try_from_secs_f64(seconds) {
            Ok(duration) => Self::Finite(duration),
            Err(_) => Self::Infinite,
        }
    }

    /// True when acquisition makes a single attempt and never sleeps.
    pub fn is_single_attempt(&self) -> bool {
        match self {
            LockTimeoutValue::NoWait => true,
            LockTimeoutValue::Finite(duration) => duration.is_zero(),
            LockTimeoutValue::Infinite => false,
        }
    }
}

impl From<Option<Duration>> for LockTimeoutValue {
    fn from(value: Option<Duration>) -> Self {
        match value {
            Some(duration) => LockTimeoutValue::Finite(duration),
            None => LockTimeoutValue::Infinite,
        }
    }
}

impl From<Duration> for LockTimeoutValue {
    fn from(value: Duration) -> Self {
        LockTimeoutValue::Finite(value)
    }
}

impl fmt::Display for LockTimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTimeoutValue::Infinite => f.write_str("infinite"),
            LockTimeoutValue::NoWait => f.write_str("nowait"),
            LockTimeoutValue::Finite(duration) => {
                if duration.subsec_nanos() == 0 {
                    write!(f, "{}s", duration.as_secs())
                } else {
                    write!(f, "{}s", duration.as_secs_f64())
                }
            }
        }
    }
}

impl TryFrom<String> for LockTimeoutValue {
    type Error = LockTimeoutParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_timeout_override(&value)
    }
}

impl From<LockTimeoutValue> for String {
    fn from(value: LockTimeoutValue) -> Self {
        match value {
            LockTimeoutValue::Finite(duration) => duration.as_secs_f64().to_string(),
            other => other.to_string(),
        }
    }
}

/// Source precedence used when resolving the effective timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeoutSource {
    #[default]
    Default,
    Config,
    Environment,
    Caller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeoutResolution {
    pub value: LockTimeoutValue,
    pub source: LockTimeoutSource,
}

impl fmt::Display for LockTimeoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockTimeoutSource::Default => "built-in default",
            LockTimeoutSource::Config => "configuration file",
            LockTimeoutSource::Environment => "environment variable",
            LockTimeoutSource::Caller => "caller override",
        };
        f.write_str(label)
    }
}

/// Error produced when parsing a timeout override fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeoutParseError {
    message: String,
}

impl fmt::Display for LockTimeoutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LockTimeoutParseError {}

impl LockTimeoutParseError {
    fn invalid_value(value: &str) -> Self {
        Self {
            message: format!(
                "Lock timeout value '{value}' is invalid. Use a number of seconds, a negative \
                 number or 'nowait' for a single attempt, or the word 'infinite'."
            ),
        }
    }
}

/// Parses a lock-timeout override originating from a caller, the environment, or configuration.
pub fn parse_timeout_override(value: &str) -> Result<LockTimeoutValue, LockTimeoutParseError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("infinite") {
        return Ok(LockTimeoutValue::Infinite);
    }
    if trimmed.eq_ignore_ascii_case("nowait") {
        return Ok(LockTimeoutValue::NoWait);
    }

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(LockTimeoutValue::from_secs(seconds));
    }

    match trimmed.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() => Ok(LockTimeoutValue::from_secs_f64(seconds)),
        _ => Err(LockTimeoutParseError::invalid_value(trimmed)),
    }
}

/// Resolves the effective timeout based on caller > env > config > default precedence.
pub struct LockTimeoutResolver<'a> {
    caller_override: Option<&'a str>,
    env_override: Option<&'a str>,
    config_value: LockTimeoutValue,
    default_value: LockTimeoutValue,
}

impl<'a> LockTimeoutResolver<'a> {
    pub fn new(
        caller_override: Option<&'a str>,
        env_override: Option<&'a str>,
        config_value: LockTimeoutValue,
        default_value: LockTimeoutValue,
    ) -> Self {
        Self {
            caller_override,
            env_override,
            config_value,
            default_value,
        }
    }

    pub fn resolve(self) -> Result<LockTimeoutResolution, LockTimeoutParseError> {
        if let Some(caller_value) = self.caller_override {
            let value = parse_timeout_override(caller_value)?;
            return Ok(LockTimeoutResolution {
                value,
                source: LockTimeoutSource::Caller,
            });
        }

        if let Some(env_value) = self.env_override {
            let value = parse_timeout_override(env_value)?;
            return Ok(LockTimeoutResolution {
                value,
                source: LockTimeoutSource::Environment,
            });
        }

        if self.config_value != self.default_value {
            return Ok(LockTimeoutResolution {
                value: self.config_value,
                source: LockTimeoutSource::Config,
            });
        }

        Ok(LockTimeoutResolution {
            value: self.default_value,
            source: LockTimeoutSource::Default,
        })
    }
}
