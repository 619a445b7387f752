//! Logger setup errors.

use thiserror::Error;

/// Errors raised while installing or reconfiguring the logger.
#[derive(Debug, Error)]
pub enum LogError {
    /// The level directives could not be parsed.
    #[error("invalid log filter [{directives}]: {message}")]
    Filter {
        /// The rejected directives.
        directives: String,
        /// Parser message.
        message: String,
    },

    /// A global subscriber is already installed.
    #[error("failed to install logger: {0}")]
    Init(String),

    /// The running subscriber refused the new filter.
    #[error("failed to reload log filter: {0}")]
    Reload(String),
}

/// Result alias for logger operations.
pub type LogResult<T> = Result<T, LogError>;
