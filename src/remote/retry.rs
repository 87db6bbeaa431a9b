use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::{RemoteError, RemoteResult};
use crate::observe::{AttemptOutcome, SyncEvent, SyncObserver};

/// Bounded retries with clamped exponential backoff.
///
/// Attempt `n` that fails is followed by a pause of
/// `clamp(base_delay * 2^(n-1), min_delay, max_delay)`, plus
/// `rate_limit_extra` when the failure was a quota rejection. The last failure
/// is returned unchanged once `max_attempts` is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  max_attempts: u32,
  base_delay: Duration,
  min_delay: Duration,
  max_delay: Duration,
  rate_limit_extra: Duration,
  retry_transient: bool,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_secs(4),
      min_delay: Duration::from_secs(4),
      max_delay: Duration::from_secs(10),
      rate_limit_extra: Duration::from_secs(10),
      retry_transient: true,
    }
  }
}

impl RetryPolicy {
  /// `max_attempts` counts the first try; values below one are raised to one.
  pub fn new(max_attempts: u32) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      ..Self::default()
    }
  }

  pub fn with_backoff(mut self, base: Duration, min: Duration, max: Duration) -> Self {
    self.base_delay = base;
    self.min_delay = min;
    self.max_delay = max.max(min);
    self
  }

  pub fn with_rate_limit_extra(mut self, extra: Duration) -> Self {
    self.rate_limit_extra = extra;
    self
  }

  /// Variant used for creates: only quota rejections are retried.
  ///
  /// Creates deliberately do not follow the general rule of retrying transient
  /// failures. A timeout or 5xx may have been applied server-side, and a retry
  /// would then create a duplicate. Quota rejections were never applied.
  pub fn rate_limit_only(&self) -> Self {
    Self {
      retry_transient: false,
      ..self.clone()
    }
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  /// Pause after failed attempt number `attempt` (1-based).
  pub fn backoff_for(&self, attempt: u32, rate_limited: bool) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = self
      .base_delay
      .saturating_mul(1 << exponent)
      .clamp(self.min_delay, self.max_delay);
    if rate_limited {
      delay.saturating_add(self.rate_limit_extra)
    } else {
      delay
    }
  }

  fn should_retry(&self, err: &RemoteError) -> bool {
    err.is_rate_limited() || (self.retry_transient && err.is_retryable())
  }

  /// Run `op` until it succeeds, fails with a non-retryable error, or the
  /// attempts are used up. Every attempt is reported to `observer`.
  pub async fn run<T, F, Fut>(
    &self,
    operation: &str,
    observer: &dyn SyncObserver,
    mut op: F,
  ) -> RemoteResult<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
  {
    let mut attempt = 1;
    loop {
      let err = match op().await {
        Ok(value) => {
          observer.record(SyncEvent::Attempt {
            operation: operation.to_string(),
            attempt,
            max_attempts: self.max_attempts,
            outcome: AttemptOutcome::Succeeded,
            delay: None,
          });
          return Ok(value);
        }
        Err(err) => err,
      };

      let rate_limited = err.is_rate_limited();
      let outcome = if rate_limited {
        AttemptOutcome::RateLimited
      } else {
        AttemptOutcome::Failed
      };

      if attempt >= self.max_attempts || !self.should_retry(&err) {
        observer.record(SyncEvent::Attempt {
          operation: operation.to_string(),
          attempt,
          max_attempts: self.max_attempts,
          outcome,
          delay: None,
        });
        return Err(err);
      }

      let delay = self.backoff_for(attempt, rate_limited);
      observer.record(SyncEvent::Attempt {
        operation: operation.to_string(),
        attempt,
        max_attempts: self.max_attempts,
        outcome,
        delay: Some(delay),
      });
      warn!(%operation, attempt, error = %err, ?delay, "retrying remote call");

      tokio::time::sleep(delay).await;
      attempt += 1;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observe::RecordingObserver;
  use std::sync::atomic::{AtomicU32, Ordering};
  use tokio::time::Instant;

  fn delays(observer: &RecordingObserver, operation: &str) -> Vec<Option<Duration>> {
    observer
      .attempts(operation)
      .into_iter()
      .map(|e| match e {
        SyncEvent::Attempt { delay, .. } => delay,
        _ => unreachable!(),
      })
      .collect()
  }

  #[test]
  fn test_backoff_doubles_and_clamps() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff_for(1, false), Duration::from_secs(4));
    assert_eq!(policy.backoff_for(2, false), Duration::from_secs(8));
    assert_eq!(policy.backoff_for(3, false), Duration::from_secs(10));
    assert_eq!(policy.backoff_for(40, false), Duration::from_secs(10));
  }

  #[test]
  fn test_backoff_respects_minimum() {
    let policy = RetryPolicy::default().with_backoff(
      Duration::from_secs(1),
      Duration::from_secs(4),
      Duration::from_secs(10),
    );
    assert_eq!(policy.backoff_for(1, false), Duration::from_secs(4));
    assert_eq!(policy.backoff_for(3, false), Duration::from_secs(4));
    assert_eq!(policy.backoff_for(4, false), Duration::from_secs(8));
  }

  #[test]
  fn test_rate_limit_adds_extra_delay() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff_for(1, true), Duration::from_secs(14));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rate_limited_operation_exhausts_attempts() {
    let policy = RetryPolicy::default();
    let observer = RecordingObserver::new();
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let start = Instant::now();

    let result: RemoteResult<()> = policy
      .run("fetch_projects", &observer, || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(RemoteError::RateLimited("exceed_query_limit".into()))
      })
      .await;

    assert_eq!(
      result,
      Err(RemoteError::RateLimited("exceed_query_limit".into()))
    );
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    let delays = delays(&observer, "fetch_projects");
    assert_eq!(
      delays,
      vec![
        Some(Duration::from_secs(14)),
        Some(Duration::from_secs(18)),
        None
      ]
    );
    let waits: Vec<_> = delays.iter().flatten().collect();
    assert!(waits.windows(2).all(|w| w[0] <= w[1]));
    assert!(Instant::now() - start >= Duration::from_secs(32));
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_failure_then_success() {
    let policy = RetryPolicy::default();
    let observer = RecordingObserver::new();
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result = policy
      .run("fetch_task", &observer, || async move {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(RemoteError::Transient("connection reset".into()))
        } else {
          Ok(7)
        }
      })
      .await;

    assert_eq!(result, Ok(7));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    let attempts = observer.attempts("fetch_task");
    assert!(matches!(
      attempts.last(),
      Some(SyncEvent::Attempt {
        attempt: 2,
        outcome: AttemptOutcome::Succeeded,
        ..
      })
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejected_is_not_retried() {
    let policy = RetryPolicy::default();
    let observer = RecordingObserver::new();
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result: RemoteResult<()> = policy
      .run("fetch_task", &observer, || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(RemoteError::Rejected {
          status: 401,
          body: "unauthorized".into(),
        })
      })
      .await;

    assert!(matches!(result, Err(RemoteError::Rejected { status: 401, .. })));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_rate_limit_only_skips_transient_retries() {
    let policy = RetryPolicy::default().rate_limit_only();
    let observer = RecordingObserver::new();
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result: RemoteResult<()> = policy
      .run("create_task", &observer, || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(RemoteError::Transient("timeout".into()))
      })
      .await;
    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    counter.store(0, Ordering::SeqCst);
    let result: RemoteResult<()> = policy
      .run("create_task", &observer, || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(RemoteError::RateLimited("429".into()))
      })
      .await;
    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn test_huge_extra_delay_saturates() {
    let policy = RetryPolicy::default().with_rate_limit_extra(Duration::MAX);
    assert_eq!(policy.backoff_for(1, true), Duration::MAX);
    assert_eq!(policy.backoff_for(1, false), Duration::from_secs(4));
  }

  #[test]
  fn test_max_attempts_never_zero() {
    assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
  }
}
