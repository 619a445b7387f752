//! Logger configuration.

mod presets;

use serde::{Deserialize, Serialize};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl Format {
    /// Parse a format name. Unknown names fall back to [`Format::Compact`].
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// What each line shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ANSI colors.
    pub colors: bool,
    /// Timestamp.
    pub time: bool,
    /// Source file and line.
    pub source: bool,
    /// Event target (module path).
    pub target: bool,
    /// Put event fields at the top level of JSON lines.
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            time: true,
            source: false,
            target: true,
            flatten: false,
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directives, e.g. `info,reflow_coordinator=debug`.
    pub level: String,
    /// Line format.
    pub format: Format,
    /// Display options.
    pub display: DisplayConfig,
    /// Install a [`ReloadHandle`](crate::ReloadHandle) for the filter.
    pub reloadable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::default(),
            display: DisplayConfig::default(),
            reloadable: false,
        }
    }
}
