use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::api_types::{ApiProjectData, NewProject, NewTask};
use super::{RemoteClient, RemoteError, RemoteResult, RATE_LIMIT_MARKER};
use crate::cache::Payload;

/// Longest error body carried inside a [`RemoteError`].
const MAX_ERROR_BODY: usize = 512;

/// TickTick open API client
#[derive(Clone)]
pub struct TickTickClient {
  http: reqwest::Client,
  base_url: Url,
  token: String,
}

impl TickTickClient {
  pub fn new(base_url: &str, token: String, timeout: Duration) -> RemoteResult<Self> {
    // Url::join drops the last segment unless the base ends with a slash.
    let base = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{base_url}/")
    };
    let base_url =
      Url::parse(&base).map_err(|e| RemoteError::Decode(format!("invalid base url {base}: {e}")))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| RemoteError::Transient(format!("failed to build http client: {e}")))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  fn endpoint(&self, path: &str) -> RemoteResult<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| RemoteError::Decode(format!("invalid endpoint {path}: {e}")))
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
    let url = self.endpoint(path)?;
    self.send(self.http.get(url)).await
  }

  async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> RemoteResult<T> {
    let url = self.endpoint(path)?;
    self.send(self.http.post(url).json(body)).await
  }

  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
    let response = request
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(transport_error)?;

    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
      return Err(classify_failure(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
  }
}

impl RemoteClient for TickTickClient {
  fn fetch_projects(&self) -> BoxFuture<'_, RemoteResult<Vec<Payload>>> {
    self.get_json("project").boxed()
  }

  fn fetch_tasks_for_project<'a>(
    &'a self,
    project_id: &'a str,
  ) -> BoxFuture<'a, RemoteResult<Vec<Payload>>> {
    async move {
      let path = format!("project/{project_id}/data");
      let data: ApiProjectData = self.get_json(&path).await?;
      Ok(data.tasks)
    }
    .boxed()
  }

  fn fetch_task<'a>(
    &'a self,
    project_id: &'a str,
    task_id: &'a str,
  ) -> BoxFuture<'a, RemoteResult<Payload>> {
    async move {
      let path = format!("project/{project_id}/task/{task_id}");
      self.get_json(&path).await
    }
    .boxed()
  }

  fn create_task<'a>(&'a self, task: &'a NewTask) -> BoxFuture<'a, RemoteResult<Payload>> {
    self.post_json("task", task).boxed()
  }

  fn create_project<'a>(
    &'a self,
    project: &'a NewProject,
  ) -> BoxFuture<'a, RemoteResult<Payload>> {
    self.post_json("project", project).boxed()
  }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
  RemoteError::Transient(e.to_string())
}

/// Map a non-success response onto the error taxonomy.
///
/// The service reports quota exhaustion either as HTTP 429 or as an error body
/// carrying the rate-limit marker (seen with 500 responses). The marker is
/// looked for in the whole body; only the carried message is truncated.
pub(crate) fn classify_failure(status: u16, body: &str) -> RemoteError {
  let rate_limited = status == 429 || body.contains(RATE_LIMIT_MARKER);
  let body = truncate(body);
  if rate_limited {
    RemoteError::RateLimited(format!("status {status}: {body}"))
  } else if status >= 500 || status == 408 {
    RemoteError::Transient(format!("status {status}: {body}"))
  } else {
    RemoteError::Rejected { status, body }
  }
}

fn truncate(body: &str) -> String {
  match body.char_indices().nth(MAX_ERROR_BODY) {
    Some((idx, _)) => format!("{}...", &body[..idx]),
    None => body.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_429_is_rate_limited() {
    assert!(classify_failure(429, "").is_rate_limited());
  }

  #[test]
  fn test_marker_in_body_is_rate_limited_regardless_of_status() {
    let body = r#"{"errorCode":"exceed_query_limit","errorMessage":"too many requests"}"#;
    assert!(classify_failure(500, body).is_rate_limited());
  }

  #[test]
  fn test_marker_beyond_truncation_is_still_rate_limited() {
    let body = format!(
      r#"{{"detail":"{}","errorCode":"exceed_query_limit"}}"#,
      "x".repeat(MAX_ERROR_BODY + 100)
    );
    match classify_failure(500, &body) {
      RemoteError::RateLimited(message) => {
        assert!(message.ends_with("..."));
        assert!(!message.contains(RATE_LIMIT_MARKER));
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn test_server_errors_are_transient() {
    assert!(matches!(
      classify_failure(503, "unavailable"),
      RemoteError::Transient(_)
    ));
    assert!(matches!(
      classify_failure(408, ""),
      RemoteError::Transient(_)
    ));
  }

  #[test]
  fn test_client_errors_are_rejected() {
    let err = classify_failure(401, "unauthorized");
    assert_eq!(
      err,
      RemoteError::Rejected {
        status: 401,
        body: "unauthorized".into()
      }
    );
    assert!(!err.is_retryable());
  }

  #[test]
  fn test_long_bodies_are_truncated() {
    let body = "x".repeat(MAX_ERROR_BODY * 2);
    match classify_failure(400, &body) {
      RemoteError::Rejected { body, .. } => assert_eq!(body.len(), MAX_ERROR_BODY + 3),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn test_endpoints_keep_base_path() {
    let client = TickTickClient::new(
      "https://api.ticktick.com/open/v1",
      "token".into(),
      Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(
      client.endpoint("project/p1/data").unwrap().as_str(),
      "https://api.ticktick.com/open/v1/project/p1/data"
    );
  }
}
