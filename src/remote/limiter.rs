use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Enforces a minimum spacing between outbound calls.
///
/// Callers queue on an async mutex (FIFO), so concurrent callers are
/// serialised through the same spacing rather than racing past it.
#[derive(Debug)]
pub struct RateLimiter {
  min_interval: Duration,
  last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
  pub fn new(min_interval: Duration) -> Self {
    Self {
      min_interval,
      last_call: Mutex::new(None),
    }
  }

  pub fn min_interval(&self) -> Duration {
    self.min_interval
  }

  /// Suspend until `min_interval` has passed since the previous `wait`
  /// returned, then record now as the last call.
  pub async fn wait(&self) {
    let mut last_call = self.last_call.lock().await;
    if let Some(previous) = *last_call {
      let elapsed = Instant::now().saturating_duration_since(previous);
      if elapsed < self.min_interval {
        let delay = self.min_interval - elapsed;
        tracing::trace!(?delay, "rate limiter delaying call");
        sleep(delay).await;
      }
    }
    *last_call = Some(Instant::now());
  }
}
