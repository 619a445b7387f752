//! Coordinator configuration.
//!
//! Loaded from TOML and then overridden from `REFLOW_*` environment
//! variables. Nested keys are separated by a double underscore:
//! `REFLOW_SCROLL__BATCH_SIZE=500` sets `scroll.batch_size`,
//! `REFLOW_REMOTE__BACKOFF__TYPE=constant` sets `remote.backoff.type`.

use std::path::Path;
use std::time::Duration;

use reflow_remote::DEFAULT_MAX_RESPONSE_BYTES;
use reflow_resilience::BackoffPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoordinatorError;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "REFLOW_";

const ENV_SEPARATOR: &str = "__";

/// Settings for talking to remote clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Largest response body buffered before failing.
    pub max_response_bytes: usize,
    /// Time allowed to establish a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Time allowed between reads.
    #[serde(with = "humantime_serde")]
    pub socket_timeout: Duration,
    /// Retry policy for the version probe.
    pub backoff: BackoffPolicy,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            connect_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Settings for reading pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// How long a scroll stays alive between pages.
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,
    /// Default documents per batch.
    pub batch_size: u32,
    /// Retry policy for rejected page requests.
    pub backoff: BackoffPolicy,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(5 * 60),
            batch_size: 1000,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Settings for relocation on shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelocationConfig {
    /// Whether top-level workers hand their work off on shutdown.
    pub enabled: bool,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete coordinator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Remote cluster settings.
    pub remote: RemoteConfig,
    /// Scroll settings.
    pub scroll: ScrollConfig,
    /// Relocation settings.
    pub relocation: RelocationConfig,
}

impl CoordinatorConfig {
    /// Parse TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, CoordinatorError> {
        let config: Self =
            toml::from_str(source).map_err(|e| CoordinatorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CoordinatorError::Config(format!("cannot read [{}]: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Apply `REFLOW_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self, CoordinatorError> {
        self.with_vars(std::env::vars())
    }

    /// Apply `REFLOW_*` overrides from `vars`. Other variables are ignored.
    pub fn with_vars<I, K, V>(self, vars: I) -> Result<Self, CoordinatorError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut tree = serde_json::to_value(&self).map_err(|e| CoordinatorError::Config(e.to_string()))?;
        let mut applied = 0usize;
        for (key, value) in vars {
            let Some(path) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let parts: Vec<String> = path
                .split(ENV_SEPARATOR)
                .map(str::to_ascii_lowercase)
                .collect();
            if parts.iter().any(String::is_empty) {
                continue;
            }
            tracing::trace!(key = key.as_ref(), "applying configuration override");
            insert_nested(&mut tree, &parts, parse_env_value(value.as_ref()));
            applied += 1;
        }
        if applied == 0 {
            return Ok(self);
        }
        let config: Self =
            serde_json::from_value(tree).map_err(|e| CoordinatorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.remote.max_response_bytes == 0 {
            return Err(CoordinatorError::Config(
                "remote.max_response_bytes must be greater than 0".to_string(),
            ));
        }
        if self.scroll.batch_size == 0 {
            return Err(CoordinatorError::Config(
                "scroll.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.scroll.keep_alive.is_zero() {
            return Err(CoordinatorError::Config(
                "scroll.keep_alive must be greater than 0".to_string(),
            ));
        }
        self.remote.backoff.validate()?;
        self.scroll.backoff.validate()?;
        Ok(())
    }
}

fn insert_nested(tree: &mut Value, parts: &[String], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    if !tree.is_object() {
        *tree = Value::Object(Map::new());
    }
    let Value::Object(map) = tree else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), value);
    } else {
        let child = map
            .entry(first.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        insert_nested(child, rest, value);
    }
}

fn parse_env_value(value: &str) -> Value {
    if let Ok(flag) = value.parse::<bool>() {
        return Value::Bool(flag);
    }
    if let Ok(number) = value.parse::<u64>() {
        return Value::from(number);
    }
    if let Ok(number) = value.parse::<f64>() {
        if number.is_finite() {
            return Value::from(number);
        }
    }
    Value::String(value.to_string())
}
