use std::future::Future;
use std::sync::Arc;

use super::{NewProject, NewTask, RateLimiter, RemoteClient, RemoteResult, RetryPolicy};
use crate::cache::Payload;
use crate::observe::SyncObserver;

/// Single choke point for remote calls.
///
/// Each attempt waits on the shared [`RateLimiter`] before the request is
/// issued; the [`RetryPolicy`] wraps limiter and call together so a retry is
/// spaced like any other call.
pub struct RemoteGateway {
  client: Arc<dyn RemoteClient>,
  limiter: RateLimiter,
  retry: RetryPolicy,
  observer: Arc<dyn SyncObserver>,
}

impl RemoteGateway {
  pub fn new(
    client: Arc<dyn RemoteClient>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    observer: Arc<dyn SyncObserver>,
  ) -> Self {
    Self {
      client,
      limiter,
      retry,
      observer,
    }
  }

  async fn throttled<T, F, Fut>(
    &self,
    operation: &str,
    policy: &RetryPolicy,
    mut call: F,
  ) -> RemoteResult<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
  {
    let limiter = &self.limiter;
    policy
      .run(operation, self.observer.as_ref(), || {
        let request = call();
        async move {
          limiter.wait().await;
          request.await
        }
      })
      .await
  }

  pub async fn fetch_projects(&self) -> RemoteResult<Vec<Payload>> {
    let client = self.client.as_ref();
    self
      .throttled("fetch_projects", &self.retry, move || client.fetch_projects())
      .await
  }

  pub async fn fetch_tasks_for_project(&self, project_id: &str) -> RemoteResult<Vec<Payload>> {
    let client = self.client.as_ref();
    self
      .throttled("fetch_tasks_for_project", &self.retry, move || {
        client.fetch_tasks_for_project(project_id)
      })
      .await
  }

  pub async fn fetch_task(&self, project_id: &str, task_id: &str) -> RemoteResult<Payload> {
    let client = self.client.as_ref();
    self
      .throttled("fetch_task", &self.retry, move || {
        client.fetch_task(project_id, task_id)
      })
      .await
  }

  pub async fn create_task(&self, task: &NewTask) -> RemoteResult<Payload> {
    let client = self.client.as_ref();
    let policy = self.retry.rate_limit_only();
    self
      .throttled("create_task", &policy, move || client.create_task(task))
      .await
  }

  pub async fn create_project(&self, project: &NewProject) -> RemoteResult<Payload> {
    let client = self.client.as_ref();
    let policy = self.retry.rate_limit_only();
    self
      .throttled("create_project", &policy, move || client.create_project(project))
      .await
  }
}
