// ABOUTME: Bounded-time polling of a fallible, idempotent check.
// ABOUTME: Surfaces the last failure's error on timeout instead of a synthetic one.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How long to keep polling, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total time budget, measured from the first attempt.
    #[serde(default = "default_max_wait", with = "humantime_serde")]
    pub max_wait: Duration,
    /// Pause between a failed attempt and the next one.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_max_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_wait: default_max_wait(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            max_wait,
            poll_interval,
        }
    }
}

/// Run `check` until it succeeds or `policy.max_wait` has elapsed.
///
/// The first attempt happens immediately. After each failure the caller
/// sleeps for `poll_interval`, unless the budget is already spent, in which
/// case the error from that last attempt is returned unchanged.
pub async fn wait_for<T, E, F, Fut>(policy: &RetryPolicy, mut check: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match check().await {
            Ok(value) => {
                tracing::debug!(attempt, elapsed = ?start.elapsed(), "check succeeded");
                return Ok(value);
            }
            Err(e) => {
                let elapsed = start.elapsed();
                if elapsed >= policy.max_wait {
                    tracing::debug!(attempt, ?elapsed, error = %e, "giving up");
                    return Err(e);
                }
                tracing::debug!(attempt, ?elapsed, error = %e, "check failed, retrying");
            }
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}
