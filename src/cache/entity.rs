//! Cached entity envelope and the result types handed back by the cache layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open field map as returned by the remote service.
///
/// The remote schema is not ours, so payloads stay untyped until the validator
/// inspects the handful of fields it requires.
pub type Payload = serde_json::Map<String, Value>;

/// The three logical collections kept in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Task,
  Project,
  Note,
}

impl EntityKind {
  pub const ALL: [EntityKind; 3] = [EntityKind::Project, EntityKind::Task, EntityKind::Note];

  /// Collection name used as the storage discriminator.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Task => "tasks",
      Self::Project => "projects",
      Self::Note => "notes",
    }
  }

  /// Fields a cached record of this kind must carry to be usable.
  pub fn required_fields(self) -> &'static [&'static str] {
    match self {
      Self::Task => &["id", "title", "projectId", "status"],
      Self::Project => &["id", "name"],
      Self::Note => &["id", "title", "content"],
    }
  }

  pub(crate) fn from_collection(name: &str) -> Option<Self> {
    match name {
      "tasks" => Some(Self::Task),
      "projects" => Some(Self::Project),
      "notes" => Some(Self::Note),
      _ => None,
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One stored record: the remote payload plus its freshness stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
  pub kind: EntityKind,
  pub id: String,
  pub payload: Payload,
  pub last_updated: DateTime<Utc>,
  /// Always `last_updated + cache duration` at write time.
  pub cache_expiry: DateTime<Utc>,
}

impl CachedEntity {
  pub fn field(&self, name: &str) -> Option<&Value> {
    self.payload.get(name)
  }

  pub fn str_field(&self, name: &str) -> Option<&str> {
    self.payload.get(name).and_then(Value::as_str)
  }

  /// Display name of a project, or title of a task/note.
  pub fn name(&self) -> Option<&str> {
    self.str_field("name").or_else(|| self.str_field("title"))
  }

  pub fn project_id(&self) -> Option<&str> {
    self.str_field("projectId")
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.cache_expiry <= now
  }
}

/// Extract the remote identifier from a payload.
///
/// Numeric ids are accepted and stringified; empty strings are not ids.
pub fn payload_id(payload: &Payload) -> Option<String> {
  match payload.get("id")? {
    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Data that was just fetched and written through.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Data served from a batch the validator accepted.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from the remote service
  Network,
  /// Valid cached data, no remote call made
  Cache,
}
