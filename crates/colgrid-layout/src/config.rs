#![forbid(unsafe_code)]

//! Per-table configuration.
//!
//! ```toml
//! table_key = "pools"
//!
//! [debug]
//! enabled = true
//! capacity = 512
//!
//! [persistence]
//! debounce_ms = 250
//! max_wait_ms = 2000
//! ```
//!
//! Environment overrides (see [`TableConfig::apply_env_overrides`]):
//!
//! | Variable | Field |
//! |---|---|
//! | `COLGRID_DEBUG` | `debug.enabled` (`1`/`true`/`on`) |
//! | `COLGRID_DEBUG_CAPACITY` | `debug.capacity` |
//! | `COLGRID_PERSIST_DEBOUNCE_MS` | `persistence.debounce_ms` |
//! | `COLGRID_PERSIST_MAX_WAIT_MS` | `persistence.max_wait_ms` |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Snapshot recording settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    /// Ring buffer size; oldest snapshots are evicted first.
    pub capacity: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 256,
        }
    }
}

/// Preference write debouncing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    pub debounce_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_wait_ms: 2_000,
        }
    }
}

impl PersistConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Identity under which preferences are stored.
    pub table_key: String,
    pub debug: DebugConfig,
    pub persistence: PersistConfig,
}

impl TableConfig {
    pub fn new(table_key: impl Into<String>) -> Self {
        Self {
            table_key: table_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce_ms: u64, max_wait_ms: u64) -> Self {
        self.persistence = PersistConfig {
            debounce_ms,
            max_wait_ms,
        };
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Returns every problem found; empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.table_key.trim().is_empty() {
            errors.push("table_key must not be empty".to_owned());
        }
        if self.debug.capacity == 0 {
            errors.push("debug.capacity must be at least 1".to_owned());
        }
        if self.persistence.max_wait_ms < self.persistence.debounce_ms {
            errors.push(format!(
                "persistence.max_wait_ms ({}) must be >= debounce_ms ({})",
                self.persistence.max_wait_ms, self.persistence.debounce_ms
            ));
        }
        errors
    }

    /// Fail with every validation message at once.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Defaults for `table_key` with `COLGRID_*` overrides from the process
    /// environment.
    pub fn from_env(table_key: impl Into<String>) -> Self {
        Self::from_env_with(table_key, |key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom lookup, for
    /// deterministic tests.
    pub fn from_env_with(
        table_key: impl Into<String>,
        get_env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::new(table_key);
        config.apply_env_overrides(get_env);
        config
    }

    /// Layer `COLGRID_*` overrides on top of an already loaded config.
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self, get_env: impl Fn(&str) -> Option<String>) {
        if let Some(val) = get_env("COLGRID_DEBUG") {
            self.debug.enabled = matches!(
                val.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(val) = get_env("COLGRID_DEBUG_CAPACITY")
            && let Ok(capacity) = val.trim().parse::<usize>()
            && capacity > 0
        {
            self.debug.capacity = capacity;
        }
        if let Some(val) = get_env("COLGRID_PERSIST_DEBOUNCE_MS")
            && let Ok(ms) = val.trim().parse()
        {
            self.persistence.debounce_ms = ms;
        }
        if let Some(val) = get_env("COLGRID_PERSIST_MAX_WAIT_MS")
            && let Ok(ms) = val.trim().parse()
        {
            self.persistence.max_wait_ms = ms;
        }
    }
}
