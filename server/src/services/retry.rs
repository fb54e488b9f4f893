// server/src/services/retry.rs

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
  Fixed(Duration),
  /// Doubles after each failed attempt, capped at `max`.
  Exponential { initial: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: Backoff,
}

impl RetryPolicy {
  pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
    Self {
      max_attempts,
      backoff: Backoff::Fixed(delay),
    }
  }

  pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
    Self {
      max_attempts,
      backoff: Backoff::Exponential { initial, max },
    }
  }

  pub fn none() -> Self {
    Self::fixed(1, Duration::ZERO)
  }

  /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
  pub fn delay_after(&self, attempt: u32) -> Duration {
    match self.backoff {
      Backoff::Fixed(delay) => delay,
      Backoff::Exponential { initial, max } => {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        initial.saturating_mul(factor).min(max)
      }
    }
  }
}

impl Default for RetryPolicy {
  /// Three attempts: 500ms, then 1s between them.
  fn default() -> Self {
    Self::exponential(3, Duration::from_millis(500), Duration::from_secs(5))
  }
}

/// Runs `operation` until it succeeds, `policy.max_attempts` is reached, or
/// `is_retryable` rejects the error. Returns the last error.
pub async fn retry_async_if<T, E, F, Fut>(
  policy: &RetryPolicy,
  label: &str,
  is_retryable: impl Fn(&E) -> bool,
  mut operation: F,
) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt = 1;
  loop {
    match operation().await {
      Ok(value) => return Ok(value),
      Err(err) if attempt < max_attempts && is_retryable(&err) => {
        let delay = policy.delay_after(attempt);
        warn!(operation = label, attempt, max_attempts, ?delay, error = %err, "Attempt failed; retrying.");
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(err) => return Err(err),
    }
  }
}

pub async fn retry_async<T, E, F, Fut>(policy: &RetryPolicy, label: &str, operation: F) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  retry_async_if(policy, label, |_| true, operation).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[test]
  fn exponential_backoff_doubles_and_caps() {
    let policy = RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(350));
    assert_eq!(policy.delay_after(1), Duration::from_millis(100));
    assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    assert_eq!(policy.delay_after(3), Duration::from_millis(350));
    assert_eq!(policy.delay_after(30), Duration::from_millis(350));
  }

  #[tokio::test]
  async fn succeeds_after_transient_failures() {
    let calls = AtomicU32::new(0);
    let calls = &calls;
    let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
    let result: Result<u32, String> = retry_async(&policy, "flaky", move || async move {
      let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
      if n < 3 {
        Err(format!("failure {n}"))
      } else {
        Ok(n)
      }
    })
    .await;
    assert_eq!(result, Ok(3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let calls = &calls;
    let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
    let result: Result<(), String> = retry_async(&policy, "down", move || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      Err("still down".to_string())
    })
    .await;
    assert_eq!(result, Err("still down".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn non_retryable_errors_return_immediately() {
    let calls = AtomicU32::new(0);
    let calls = &calls;
    let policy = RetryPolicy::fixed(5, Duration::from_millis(1));
    let result: Result<(), String> = retry_async_if(
      &policy,
      "rejected",
      |e: &String| !e.starts_with("400"),
      move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err("400 bad request".to_string())
      },
    )
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
