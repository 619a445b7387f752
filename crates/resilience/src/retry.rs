//! Scheduled retry loop.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or `policy` runs out of delays.
///
/// `on_retry` is called exactly once per retry, before the delay. When the
/// policy is exhausted the last error is returned unchanged. Delays are
/// scheduled with [`tokio::time::sleep`].
pub async fn retry_with_backoff<T, E, F, Fut, R, C>(
    policy: &BackoffPolicy,
    is_retryable: R,
    mut on_retry: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    C: FnMut(&E),
    E: fmt::Display,
{
    let start = Instant::now();
    let mut delays = policy.iter();

    loop {
        let error = match operation().await {
            Ok(value) => {
                if delays.attempts() > 0 {
                    debug!(
                        retries = delays.attempts(),
                        elapsed_ms = start.elapsed().as_millis(),
                        "retry succeeded"
                    );
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !is_retryable(&error) {
            return Err(error);
        }

        let Some(delay) = delays.next() else {
            warn!(
                retries = delays.attempts(),
                policy = policy.name(),
                %error,
                "giving up after exhausting retries"
            );
            return Err(error);
        };

        on_retry(&error);
        debug!(
            attempt = delays.attempts(),
            delay_ms = delay.as_millis(),
            %error,
            "retrying after delay"
        );
        sleep(delay).await;
    }
}
