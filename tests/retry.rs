// ABOUTME: Integration tests for the bounded retry primitive.
// ABOUTME: Uses paused tokio time to check elapsed-time bounds exactly.

use haul::retry::{RetryPolicy, wait_for};
use std::cell::Cell;
use std::time::Duration;
use tokio::time::Instant;

/// Test: a check that always fails.
/// Expected: returns within max_wait + poll_interval with the last attempt's error.
#[tokio::test(start_paused = true)]
async fn always_failing_returns_last_error_in_time() {
    let policy = RetryPolicy::new(Duration::from_secs(2), Duration::from_millis(300));
    let attempts = Cell::new(0u32);
    let start = Instant::now();

    let result: Result<(), String> = wait_for(&policy, || {
        attempts.set(attempts.get() + 1);
        let n = attempts.get();
        async move { Err(format!("failure {n}")) }
    })
    .await;

    let elapsed = start.elapsed();
    assert!(elapsed >= policy.max_wait);
    assert!(elapsed <= policy.max_wait + policy.poll_interval);
    assert_eq!(result, Err(format!("failure {}", attempts.get())));
}

/// Test: success on the third attempt.
/// Expected: exactly two sleeps, no sleep after the success.
#[tokio::test(start_paused = true)]
async fn success_after_two_failures_sleeps_twice() {
    let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_millis(100));
    let attempts = Cell::new(0u32);
    let start = Instant::now();

    let result: Result<u32, &str> = wait_for(&policy, || {
        attempts.set(attempts.get() + 1);
        let n = attempts.get();
        async move { if n < 3 { Err("not yet") } else { Ok(n) } }
    })
    .await;

    assert_eq!(result, Ok(3));
    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

/// Test: policy parsed from YAML with human-readable durations.
/// Expected: both fields honoured; missing fields fall back to defaults.
#[test]
fn policy_from_yaml() {
    let policy: RetryPolicy =
        serde_yaml::from_str("max_wait: 30s\npoll_interval: 1s\n").unwrap();
    assert_eq!(policy, RetryPolicy::new(Duration::from_secs(30), Duration::from_secs(1)));

    let policy: RetryPolicy = serde_yaml::from_str("max_wait: 1m\n").unwrap();
    assert_eq!(policy.max_wait, Duration::from_secs(60));
    assert_eq!(policy.poll_interval, Duration::from_millis(100));
}
