//! Access to the remote task service.
//!
//! The service enforces a hard per-minute request quota, so every call made by
//! the sync core goes through a [`RemoteGateway`]: one shared [`RateLimiter`]
//! spacing calls, wrapped in a [`RetryPolicy`] that backs off harder when the
//! service signals quota exhaustion.

mod api_types;
mod client;
mod gateway;
mod limiter;
mod retry;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::cache::Payload;

pub use api_types::{NewProject, NewTask};
pub use client::TickTickClient;
pub use gateway::RemoteGateway;
pub use limiter::RateLimiter;
pub use retry::RetryPolicy;

/// Marker the service puts in error bodies when the request quota is spent.
pub const RATE_LIMIT_MARKER: &str = "exceed_query_limit";

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Failures reported by a [`RemoteClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
  /// Quota exhausted; retried after an extended cooldown.
  #[error("remote rate limit exceeded: {0}")]
  RateLimited(String),

  /// Network failure, timeout or server-side error; retried with backoff.
  #[error("remote request failed: {0}")]
  Transient(String),

  /// The service refused the request (bad credentials, unknown id, ...).
  #[error("remote rejected request with status {status}: {body}")]
  Rejected { status: u16, body: String },

  #[error("unexpected remote response: {0}")]
  Decode(String),
}

impl RemoteError {
  pub fn is_rate_limited(&self) -> bool {
    matches!(self, Self::RateLimited(_))
  }

  /// Whether repeating the same request can reasonably succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::RateLimited(_) | Self::Transient(_))
  }
}

/// Black-box client for the remote task service.
///
/// Entities come back as open JSON maps; nothing here interprets them beyond
/// what the wire format requires.
///
/// Implementations must not issue the request before the returned future is
/// first polled: the gateway creates the future, then awaits the rate limiter,
/// and only then polls it.
pub trait RemoteClient: Send + Sync {
  fn fetch_projects(&self) -> BoxFuture<'_, RemoteResult<Vec<Payload>>>;

  fn fetch_tasks_for_project<'a>(
    &'a self,
    project_id: &'a str,
  ) -> BoxFuture<'a, RemoteResult<Vec<Payload>>>;

  /// A single task. The service addresses tasks through their project.
  fn fetch_task<'a>(
    &'a self,
    project_id: &'a str,
    task_id: &'a str,
  ) -> BoxFuture<'a, RemoteResult<Payload>>;

  fn create_task<'a>(&'a self, task: &'a NewTask) -> BoxFuture<'a, RemoteResult<Payload>>;

  fn create_project<'a>(&'a self, project: &'a NewProject)
    -> BoxFuture<'a, RemoteResult<Payload>>;
}
