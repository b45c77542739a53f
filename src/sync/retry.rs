//! Exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::error::RemoteError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Total attempts, including the first
  pub times: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
  pub factor: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from(&SyncConfig::default())
  }
}

impl From<&SyncConfig> for RetryPolicy {
  fn from(config: &SyncConfig) -> Self {
    Self {
      times: config.retry_times.max(1),
      initial_delay: config.initial_delay,
      max_delay: config.max_delay,
      factor: 2,
    }
  }
}

impl RetryPolicy {
  /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let multiplier = self.factor.saturating_pow(exponent);
    self.initial_delay.saturating_mul(multiplier).min(self.max_delay)
  }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. Returns the last error.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RemoteError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, RemoteError>>,
{
  let mut attempt = 1;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_retryable() && attempt < policy.times => {
        let delay = policy.delay_after(attempt);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying remote call");
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn policy(times: u32, initial_ms: u64) -> RetryPolicy {
    RetryPolicy {
      times,
      initial_delay: Duration::from_millis(initial_ms),
      max_delay: Duration::from_secs(30),
      factor: 2,
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_then_success_waits_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let started = tokio::time::Instant::now();

    let counter = calls.clone();
    let result = retry_with_backoff(&policy(3, 1000), move || {
      let counter = counter.clone();
      async move {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(RemoteError::Network("reset".into()))
        } else {
          Ok("done")
        }
      }
    })
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(1000) && waited < Duration::from_millis(1100));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejection_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<(), _> = retry_with_backoff(&policy(5, 10), move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async { Err(RemoteError::from_status(422, "bad row")) }
    })
    .await;

    assert!(matches!(result, Err(RemoteError::Rejected { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_all_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let started = tokio::time::Instant::now();

    let result: Result<(), _> = retry_with_backoff(&policy(3, 100), move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async { Err(RemoteError::from_status(503, "down")) }
    })
    .await;

    assert!(result.unwrap_err().is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 100ms then 200ms
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(300) && waited < Duration::from_millis(400));
  }

  #[test]
  fn test_delay_is_capped() {
    let p = RetryPolicy {
      max_delay: Duration::from_millis(5000),
      ..policy(10, 1000)
    };
    assert_eq!(p.delay_after(1), Duration::from_millis(1000));
    assert_eq!(p.delay_after(3), Duration::from_millis(4000));
    assert_eq!(p.delay_after(4), Duration::from_millis(5000));
  }
}
