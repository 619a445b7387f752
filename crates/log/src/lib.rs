#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Reflow Log
//!
//! `tracing` subscriber setup shared by reflow services.
//!
//! - [`Config`]: level directives, output [`Format`] and display options,
//!   with presets and environment loading
//! - [`LoggerBuilder`]: installs the global subscriber
//! - [`ReloadHandle`]: changes the level filter at runtime
//!
//! ```no_run
//! let _guard = reflow_log::init()?;
//! tracing::info!("ready");
//! # Ok::<(), reflow_log::LogError>(())
//! ```

pub mod builder;
pub mod config;
pub mod error;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

/// Install a logger configured from the environment.
///
/// See [`Config::from_env`] for the variables read.
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::from_env())
}

/// Install a logger with `config`.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
