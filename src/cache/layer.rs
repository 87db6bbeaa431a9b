//! Cache layer that orchestrates validation with network fetching.

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};

use super::entity::{CacheResult, CachedEntity, EntityKind, Payload};
use super::storage::{CacheFilter, CacheStore};
use super::validator;
use crate::error::{Error, Result};
use crate::observe::{SyncEvent, SyncObserver};

/// Cache layer that manages caching logic and network fetching.
///
/// Every read goes through the validator; a rejected batch is refetched as a
/// whole and written through before being returned. There is no fallback to
/// stale data when the fetch fails.
pub struct CacheLayer<S: CacheStore> {
  store: Arc<S>,
  observer: Arc<dyn SyncObserver>,
}

impl<S: CacheStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(store: Arc<S>, observer: Arc<dyn SyncObserver>) -> Self {
    Self { store, observer }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Fetch a batch with cache-first strategy.
  ///
  /// 1. Read every cached record of `kind` matching `filter`
  /// 2. If the validator accepts the batch, return it
  /// 3. Otherwise run `fetcher` (normally a remote call)
  /// 4. Write the fetched batch through with `ttl`
  pub async fn fetch_batch<F, Fut, E>(
    &self,
    kind: EntityKind,
    filter: &CacheFilter,
    ttl: Duration,
    fetcher: F,
  ) -> Result<CacheResult<Vec<CachedEntity>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Vec<Payload>, E>>,
    Error: From<E>,
  {
    let scope = filter.scope();
    let cached = self.store.query(kind, filter)?;

    let verdict = validator::validate(&cached, kind, Utc::now());
    if verdict.is_valid() {
      self.observer.record(SyncEvent::CacheHit {
        kind,
        scope,
        count: cached.len(),
      });
      return Ok(CacheResult::from_cache(cached));
    }

    self.observer.record(SyncEvent::CacheMiss {
      kind,
      scope: scope.clone(),
      reason: verdict.to_string(),
    });

    let fetched = fetcher().await?;
    if fetched.is_empty() {
      tracing::warn!(%kind, %scope, "remote returned no entities");
    }
    let written = self.write_through(kind, &scope, &fetched, ttl)?;
    Ok(CacheResult::from_network(written))
  }

  /// Store freshly fetched payloads, stamped with the current time.
  pub fn write_through(
    &self,
    kind: EntityKind,
    scope: &str,
    payloads: &[Payload],
    ttl: Duration,
  ) -> Result<Vec<CachedEntity>> {
    let written = self.store.upsert_all(kind, payloads, Utc::now(), ttl)?;
    self.observer.record(SyncEvent::WriteThrough {
      kind,
      scope: scope.to_string(),
      count: written.len(),
    });
    Ok(written)
  }
}

impl<S: CacheStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      observer: Arc::clone(&self.observer),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStore};
  use crate::observe::RecordingObserver;
  use crate::remote::RemoteError;
  use serde_json::{json, Value};
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn project(id: &str, name: &str) -> Payload {
    match json!({"id": id, "name": name}) {
      Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  fn layer() -> (CacheLayer<SqliteStore>, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    (CacheLayer::new(store, observer.clone()), observer)
  }

  #[tokio::test]
  async fn test_miss_fetches_and_writes_through() {
    let (layer, observer) = layer();
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    let result = layer
      .fetch_batch(
        EntityKind::Project,
        &CacheFilter::all(),
        Duration::hours(1),
        || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, RemoteError>(vec![project("p1", "Work"), project("p2", "Home")])
        },
      )
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.len(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(layer.store().count(EntityKind::Project).unwrap(), 2);
    assert!(observer
      .events()
      .iter()
      .any(|e| matches!(e, SyncEvent::CacheMiss { reason, .. } if reason == "no cached entities")));
  }

  #[tokio::test]
  async fn test_valid_cache_skips_fetch() {
    let (layer, observer) = layer();
    layer
      .write_through(
        EntityKind::Project,
        "all",
        &[project("p1", "Work")],
        Duration::hours(1),
      )
      .unwrap();

    let result = layer
      .fetch_batch(
        EntityKind::Project,
        &CacheFilter::all(),
        Duration::hours(1),
        || async { Err(RemoteError::Transient("fetcher must not run".into())) },
      )
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.len(), 1);
    assert!(observer
      .events()
      .iter()
      .any(|e| matches!(e, SyncEvent::CacheHit { count: 1, .. })));
  }

  #[tokio::test]
  async fn test_fetch_failure_propagates_without_stale_fallback() {
    let (layer, _) = layer();
    // Already expired: the validator rejects it.
    layer
      .write_through(
        EntityKind::Project,
        "all",
        &[project("p1", "Work")],
        Duration::seconds(-1),
      )
      .unwrap();

    let result = layer
      .fetch_batch(
        EntityKind::Project,
        &CacheFilter::all(),
        Duration::hours(1),
        || async { Err(RemoteError::Transient("connection reset".into())) },
      )
      .await;

    assert!(matches!(
      result,
      Err(crate::Error::Remote(RemoteError::Transient(_)))
    ));
    // The stale record is left in place, not deleted.
    assert_eq!(layer.store().count(EntityKind::Project).unwrap(), 1);
  }
}
