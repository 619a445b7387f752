//! Backoff policies: finite or unbounded sequences of retry delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Longest delay a policy may produce.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(300);

/// Jitter applied on top of a computed delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Use the computed delay exactly.
    #[default]
    None,
    /// `random(0, delay)`.
    Full,
    /// `delay / 2 + random(0, delay / 2)`.
    Equal,
}

impl JitterPolicy {
    /// Apply jitter to `delay`.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        match self {
            Self::None => delay,
            Self::Full if millis == 0 => delay,
            Self::Full => Duration::from_millis(fastrand::u64(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                let jitter = if half > 0 { fastrand::u64(0..=half) } else { 0 };
                Duration::from_millis(half + jitter)
            }
        }
    }
}

/// Sequence of delays between retries of a transient failure.
///
/// `max_retries` bounds the sequence; `None` makes it unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Never retry.
    None,
    /// The same delay before every retry.
    Constant {
        /// Delay between attempts.
        #[serde(with = "humantime_serde")]
        delay: Duration,
        /// Number of retries.
        #[serde(default)]
        max_retries: Option<u32>,
    },
    /// `initial * multiplier^n`, capped at `max_delay`.
    Exponential {
        /// First delay.
        #[serde(with = "humantime_serde")]
        initial: Duration,
        /// Growth factor, at least 1.
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        /// Upper bound of a single delay.
        #[serde(with = "humantime_serde", default = "default_max_delay")]
        max_delay: Duration,
        /// Number of retries.
        #[serde(default)]
        max_retries: Option<u32>,
        /// Jitter applied to each delay.
        #[serde(default)]
        jitter: JitterPolicy,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(500), 10)
    }
}

impl BackoffPolicy {
    /// Constant delay, `max_retries` times.
    #[must_use]
    pub fn constant(delay: Duration, max_retries: u32) -> Self {
        Self::Constant {
            delay,
            max_retries: Some(max_retries),
        }
    }

    /// Doubling delay starting at `initial`, `max_retries` times.
    #[must_use]
    pub fn exponential(initial: Duration, max_retries: u32) -> Self {
        Self::Exponential {
            initial,
            multiplier: default_multiplier(),
            max_delay: default_max_delay(),
            max_retries: Some(max_retries),
            jitter: JitterPolicy::None,
        }
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Constant { .. } => "constant",
            Self::Exponential { .. } => "exponential",
        }
    }

    /// Retry bound; `None` when unbounded.
    #[must_use]
    pub fn max_retries(&self) -> Option<u32> {
        match self {
            Self::None => Some(0),
            Self::Constant { max_retries, .. } | Self::Exponential { max_retries, .. } => {
                *max_retries
            }
        }
    }

    /// Delay before retry number `attempt` (0-based), ignoring the bound.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant { delay, .. } => *delay,
            Self::Exponential {
                initial,
                multiplier,
                max_delay,
                jitter,
                ..
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let millis = initial.as_millis() as f64 * multiplier.powi(exponent);
                let capped = if millis.is_finite() && millis < max_delay.as_millis() as f64 {
                    Duration::from_millis(millis as u64)
                } else {
                    *max_delay
                };
                jitter.apply(capped)
            }
        }
    }

    /// Iterate the delays of this policy.
    #[must_use]
    pub fn iter(&self) -> Backoff<'_> {
        Backoff {
            policy: self,
            attempt: 0,
        }
    }

    /// Check the policy can be used.
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            Self::None => Ok(()),
            Self::Constant { delay, .. } => check_delay("delay", *delay),
            Self::Exponential {
                initial,
                multiplier,
                max_delay,
                ..
            } => {
                check_delay("initial", *initial)?;
                check_delay("max_delay", *max_delay)?;
                if !(multiplier.is_finite() && *multiplier >= 1.0) {
                    return Err(ConfigError::invalid(
                        "multiplier",
                        format!("must be a finite value >= 1 but was [{multiplier}]"),
                    ));
                }
                if max_delay < initial {
                    return Err(ConfigError::invalid(
                        "max_delay",
                        "must not be shorter than the initial delay",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn check_delay(field: &'static str, delay: Duration) -> ConfigResult<()> {
    if delay > MAX_BACKOFF_DELAY {
        return Err(ConfigError::invalid(
            field,
            format!("must not exceed {MAX_BACKOFF_DELAY:?} but was {delay:?}"),
        ));
    }
    Ok(())
}

impl<'a> IntoIterator for &'a BackoffPolicy {
    type Item = Duration;
    type IntoIter = Backoff<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the delays of a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    policy: &'a BackoffPolicy,
    attempt: u32,
}

impl Backoff<'_> {
    /// Retries handed out so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self
            .policy
            .max_retries()
            .is_some_and(|max| self.attempt >= max)
        {
            return None;
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}
