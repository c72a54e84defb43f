use crate::error::{LockError, Result};
use crate::locking::acquisition::DEFAULT_POLL_INTERVAL;
use crate::locking::backend::BackendKind;
use crate::locking::timeout::{LockTimeoutResolution, LockTimeoutResolver, LockTimeoutValue};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "pathlock.toml";
pub const DEFAULT_DATABASE_FILE: &str = "pathlock-records.sqlite3";

pub const ENV_BACKEND: &str = "PATHLOCK_BACKEND";
pub const ENV_TIMEOUT: &str = "PATHLOCK_TIMEOUT";
pub const ENV_THREADED: &str = "PATHLOCK_THREADED";
pub const ENV_DATABASE: &str = "PATHLOCK_DATABASE";

const DEFAULT_TIMEOUT: LockTimeoutValue = LockTimeoutValue::Infinite;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockingConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default = "default_threaded")]
    pub threaded: bool,

    #[serde(default = "default_timeout", with = "timeout_format")]
    pub timeout: LockTimeoutValue,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            threaded: default_threaded(),
            timeout: default_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            database_path: None,
        }
    }
}

fn default_threaded() -> bool {
    true
}

fn default_timeout() -> LockTimeoutValue {
    DEFAULT_TIMEOUT
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

mod timeout_format {
    use crate::locking::timeout::LockTimeoutValue;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &LockTimeoutValue,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<LockTimeoutValue, D::Error> {
        let raw = String::deserialize(deserializer)?;
        LockTimeoutValue::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl LockingConfig {
    /// Loads `pathlock.toml` from `dir`, falling back to defaults when absent.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_from(&dir.join(CONFIG_FILE_NAME))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            log::debug!("Config file not found at {config_path:?}, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: LockingConfig = toml::from_str(&contents).map_err(|e| {
            LockError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        log::debug!("Loaded config from {config_path:?}");
        Ok(config)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| LockError::ConfigError(format!("Failed to serialize config: {e}")))?;

        fs::write(&config_path, contents)?;
        log::debug!("Saved config to {config_path:?}");
        Ok(())
    }

    /// Applies `PATHLOCK_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_with(|key| env::var(key).ok())
    }

    /// Applies overrides read through `lookup`, keyed by the `PATHLOCK_*` names.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.backend = backend.parse()?;
        }

        if let Some(threaded) = lookup(ENV_THREADED) {
            self.threaded = parse_bool(&threaded).ok_or_else(|| {
                LockError::ConfigError(format!(
                    "{ENV_THREADED} must be true or false, got '{threaded}'"
                ))
            })?;
        }

        if let Some(timeout) = lookup(ENV_TIMEOUT) {
            self.timeout = self.resolve_timeout(None, Some(&timeout))?.value;
        }

        if let Some(database) = lookup(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(database));
        }

        Ok(())
    }

    /// Resolves the effective timeout: caller > environment > config > default.
    pub fn resolve_timeout(
        &self,
        caller_override: Option<&str>,
        env_override: Option<&str>,
    ) -> Result<LockTimeoutResolution> {
        let resolution =
            LockTimeoutResolver::new(caller_override, env_override, self.timeout, DEFAULT_TIMEOUT)
                .resolve()?;
        Ok(resolution)
    }

    pub fn timeout_value(&self) -> LockTimeoutValue {
        self.timeout
    }

    pub fn set_timeout_value(&mut self, value: LockTimeoutValue) {
        self.timeout = value;
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| env::temp_dir().join(DEFAULT_DATABASE_FILE))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
