//! Configuration presets and environment loading

use super::{Config, DisplayConfig, Format};

impl Config {
    /// Configuration from the process environment.
    ///
    /// - `REFLOW_LOG`, else `RUST_LOG`: filter directives
    /// - `REFLOW_LOG_FORMAT`: `pretty`, `compact` or `json`
    /// - `REFLOW_LOG_COLORS`, `REFLOW_LOG_SOURCE`: `true` or `false`
    /// - `REFLOW_LOG_RELOADABLE`: `true` or `false`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// [`from_env`](Self::from_env) over an explicit set of variables.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();
        let mut rust_log = None;
        let mut reflow_log = None;

        for (key, value) in vars {
            match key.as_str() {
                "REFLOW_LOG" => reflow_log = Some(value),
                "RUST_LOG" => rust_log = Some(value),
                "REFLOW_LOG_FORMAT" => config.format = Format::parse_lenient(&value),
                "REFLOW_LOG_COLORS" => {
                    config.display.colors = flag(&value).unwrap_or(config.display.colors);
                }
                "REFLOW_LOG_SOURCE" => {
                    config.display.source = flag(&value).unwrap_or(config.display.source);
                }
                "REFLOW_LOG_RELOADABLE" => {
                    config.reloadable = flag(&value).unwrap_or(config.reloadable);
                }
                _ => {}
            }
        }
        if let Some(level) = reflow_log.or(rust_log) {
            config.level = level;
        }
        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            reloadable: true,
        }
    }

    /// Test configuration: everything, no colors, no timestamps.
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}

fn flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
