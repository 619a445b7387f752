#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Reflow Resilience
//!
//! Retry support for talking to a flaky peer:
//!
//! - [`BackoffPolicy`]: `none`, `constant` or `exponential` delay sequences,
//!   bounded or unbounded, loadable from configuration
//! - [`JitterPolicy`]: optional randomisation of each delay
//! - [`retry_with_backoff`]: the retry loop, which only retries errors the
//!   caller classifies as transient and schedules every delay on the runtime

pub mod backoff;
pub mod error;
pub mod retry;

pub use backoff::{Backoff, BackoffPolicy, JitterPolicy, MAX_BACKOFF_DELAY};
pub use error::{ConfigError, ConfigResult};
pub use retry::retry_with_backoff;
