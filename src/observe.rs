//! Structured sync events and the sinks that receive them.
//!
//! The engine, cache layer and retry policy never log through globals for
//! anything a caller might want to count; they hand a [`SyncEvent`] to an
//! injected [`SyncObserver`]. [`TracingObserver`] is the default sink.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::EntityKind;

/// Outcome of a single remote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
  Succeeded,
  RateLimited,
  Failed,
}

/// Something observable that happened during a sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
  /// One execution of a remote operation. `delay` is the pause before the
  /// next attempt, `None` when no further attempt follows.
  Attempt {
    operation: String,
    attempt: u32,
    max_attempts: u32,
    outcome: AttemptOutcome,
    delay: Option<Duration>,
  },
  CacheHit {
    kind: EntityKind,
    scope: String,
    count: usize,
  },
  CacheMiss {
    kind: EntityKind,
    scope: String,
    reason: String,
  },
  WriteThrough {
    kind: EntityKind,
    scope: String,
    count: usize,
  },
  /// One project's task sync failed without aborting the cycle.
  ScopeFailed {
    kind: EntityKind,
    scope: String,
    error: String,
  },
}

/// Sink for [`SyncEvent`]s.
pub trait SyncObserver: Send + Sync {
  fn record(&self, event: SyncEvent);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
  fn record(&self, event: SyncEvent) {
    match event {
      SyncEvent::Attempt {
        operation,
        attempt,
        max_attempts,
        outcome,
        delay,
      } => match outcome {
        AttemptOutcome::Succeeded => {
          debug!(%operation, attempt, max_attempts, "remote call succeeded")
        }
        _ => warn!(
          %operation,
          attempt,
          max_attempts,
          ?outcome,
          retry_in = ?delay,
          "remote call failed"
        ),
      },
      SyncEvent::CacheHit { kind, scope, count } => {
        info!(%kind, %scope, count, "using cached entities")
      }
      SyncEvent::CacheMiss {
        kind,
        scope,
        reason,
      } => info!(%kind, %scope, %reason, "cache invalid, refreshing"),
      SyncEvent::WriteThrough { kind, scope, count } => {
        info!(%kind, %scope, count, "wrote fetched entities to cache")
      }
      SyncEvent::ScopeFailed { kind, scope, error } => {
        warn!(%kind, %scope, %error, "sync failed for scope, continuing")
      }
    }
  }
}

/// Keeps every event in memory. Handy for embedding callers and tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
  events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of the events recorded so far.
  pub fn events(&self) -> Vec<SyncEvent> {
    match self.events.lock() {
      Ok(events) => events.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// Attempt events for the named operation, in order.
  pub fn attempts(&self, operation: &str) -> Vec<SyncEvent> {
    self
      .events()
      .into_iter()
      .filter(|e| matches!(e, SyncEvent::Attempt { operation: op, .. } if op == operation))
      .collect()
  }
}

impl SyncObserver for RecordingObserver {
  fn record(&self, event: SyncEvent) {
    match self.events.lock() {
      Ok(mut events) => events.push(event),
      Err(poisoned) => poisoned.into_inner().push(event),
    }
  }
}
