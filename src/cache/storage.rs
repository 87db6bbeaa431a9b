//! Cache store trait and SQLite implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use super::entity::{payload_id, CachedEntity, EntityKind, Payload};
use crate::error::{Error, Result};

/// Optional narrowing of a collection query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheFilter {
  pub project_id: Option<String>,
}

impl CacheFilter {
  pub fn all() -> Self {
    Self::default()
  }

  pub fn project(project_id: impl Into<String>) -> Self {
    Self {
      project_id: Some(project_id.into()),
    }
  }

  /// Human-readable scope, used in logs and events.
  pub fn scope(&self) -> String {
    match &self.project_id {
      Some(id) => format!("project {id}"),
      None => "all".to_string(),
    }
  }
}

/// Trait for cache storage backends.
///
/// Exactly one record exists per `(kind, id)`. Records are only ever replaced,
/// never evicted: expiry is judged at read time.
pub trait CacheStore: Send + Sync {
  /// Insert or fully replace the record `(kind, id)`, stamping
  /// `last_updated = now` and `cache_expiry = now + cache_duration`.
  fn upsert(
    &self,
    kind: EntityKind,
    id: &str,
    payload: &Payload,
    now: DateTime<Utc>,
    cache_duration: Duration,
  ) -> Result<CachedEntity>;

  /// Upsert every payload in one transaction, ids taken from the payloads.
  ///
  /// Payloads without an id are skipped; the written records are returned.
  fn upsert_all(
    &self,
    kind: EntityKind,
    payloads: &[Payload],
    now: DateTime<Utc>,
    cache_duration: Duration,
  ) -> Result<Vec<CachedEntity>>;

  /// All records of `kind` matching `filter`, regardless of expiry.
  fn query(&self, kind: EntityKind, filter: &CacheFilter) -> Result<Vec<CachedEntity>>;

  /// As [`CacheStore::query`], restricted to `cache_expiry > now`.
  fn query_unexpired(
    &self,
    kind: EntityKind,
    filter: &CacheFilter,
    now: DateTime<Utc>,
  ) -> Result<Vec<CachedEntity>>;

  /// A single record by id.
  fn get(&self, kind: EntityKind, id: &str) -> Result<Option<CachedEntity>>;

  fn count(&self, kind: EntityKind) -> Result<usize>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path().ok_or(Error::NoDataDir)?;
    Self::open_at(&path)
  }

  /// Open (or create) the store at `path`, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    let conn = Connection::open(path)?;
    debug!(path = %path.display(), "opened cache database");
    Self::from_connection(conn)
  }

  /// In-memory store, gone when dropped.
  pub fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Option<std::path::PathBuf> {
    let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
    Some(data_dir.join("tickmirror").join("cache.db"))
  }

  /// Create tables and indices. Any failure here (for example duplicate ids
  /// left behind by an older writer) aborts start-up.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::LockPoisoned(e.to_string()))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per (entity_kind, entity_id); payload stored as JSON
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_kind TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    project_id TEXT,
    data BLOB NOT NULL,
    last_updated INTEGER NOT NULL,
    cache_expiry INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_entity_cache_key
    ON entity_cache(entity_kind, entity_id);

CREATE INDEX IF NOT EXISTS idx_entity_cache_project
    ON entity_cache(entity_kind, project_id);

CREATE INDEX IF NOT EXISTS idx_entity_cache_last_updated
    ON entity_cache(entity_kind, last_updated);

CREATE INDEX IF NOT EXISTS idx_entity_cache_expiry
    ON entity_cache(entity_kind, cache_expiry);
"#;

const UPSERT_SQL: &str = "INSERT INTO entity_cache
     (entity_kind, entity_id, project_id, data, last_updated, cache_expiry)
   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
   ON CONFLICT(entity_kind, entity_id) DO UPDATE SET
     project_id = excluded.project_id,
     data = excluded.data,
     last_updated = excluded.last_updated,
     cache_expiry = excluded.cache_expiry";

const SELECT_COLUMNS: &str =
  "SELECT entity_kind, entity_id, data, last_updated, cache_expiry FROM entity_cache";

/// Write one record on an open connection or transaction.
///
/// Both stamps are validated before anything is written, so a record whose
/// expiry cannot be represented never reaches the table.
fn write_record(
  conn: &Connection,
  kind: EntityKind,
  id: &str,
  payload: &Payload,
  now: DateTime<Utc>,
  cache_duration: Duration,
) -> Result<CachedEntity> {
  let last_updated = from_millis(now.timestamp_millis())?;
  let cache_expiry = expiry_for(last_updated, cache_duration)?;
  let data = serde_json::to_vec(payload)?;
  let project_id = payload.get("projectId").and_then(|v| v.as_str());

  conn.execute(
    UPSERT_SQL,
    params![
      kind.as_str(),
      id,
      project_id,
      data,
      last_updated.timestamp_millis(),
      cache_expiry.timestamp_millis()
    ],
  )?;

  Ok(CachedEntity {
    kind,
    id: id.to_string(),
    payload: payload.clone(),
    last_updated,
    cache_expiry,
  })
}

/// `last_updated + cache_duration` at millisecond precision, if representable.
fn expiry_for(last_updated: DateTime<Utc>, cache_duration: Duration) -> Result<DateTime<Utc>> {
  let out_of_range = || Error::ExpiryOutOfRange {
    seconds: cache_duration.num_seconds(),
  };
  let expiry = last_updated
    .checked_add_signed(cache_duration)
    .ok_or_else(out_of_range)?;
  DateTime::from_timestamp_millis(expiry.timestamp_millis()).ok_or_else(out_of_range)
}

struct RawRow {
  kind: String,
  id: String,
  data: Vec<u8>,
  last_updated: i64,
  cache_expiry: i64,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
  Ok(RawRow {
    kind: row.get(0)?,
    id: row.get(1)?,
    data: row.get(2)?,
    last_updated: row.get(3)?,
    cache_expiry: row.get(4)?,
  })
}

impl RawRow {
  fn into_entity(self) -> Result<CachedEntity> {
    let kind =
      EntityKind::from_collection(&self.kind).ok_or_else(|| Error::UnknownKind(self.kind.clone()))?;
    Ok(CachedEntity {
      kind,
      id: self.id,
      payload: serde_json::from_slice(&self.data)?,
      last_updated: from_millis(self.last_updated)?,
      cache_expiry: from_millis(self.cache_expiry)?,
    })
  }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms).ok_or(Error::InvalidTimestamp(ms))
}

impl SqliteStore {
  fn select(
    &self,
    kind: EntityKind,
    filter: &CacheFilter,
    expiring_after: Option<DateTime<Utc>>,
  ) -> Result<Vec<CachedEntity>> {
    let conn = self.lock()?;

    let mut sql = format!("{SELECT_COLUMNS} WHERE entity_kind = ?");
    let mut values = vec![SqlValue::Text(kind.as_str().to_string())];

    if let Some(project_id) = &filter.project_id {
      sql.push_str(" AND project_id = ?");
      values.push(SqlValue::Text(project_id.clone()));
    }
    if let Some(now) = expiring_after {
      sql.push_str(" AND cache_expiry > ?");
      values.push(SqlValue::Integer(now.timestamp_millis()));
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map(params_from_iter(values), raw_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter().map(RawRow::into_entity).collect()
  }
}

impl CacheStore for SqliteStore {
  fn upsert(
    &self,
    kind: EntityKind,
    id: &str,
    payload: &Payload,
    now: DateTime<Utc>,
    cache_duration: Duration,
  ) -> Result<CachedEntity> {
    let conn = self.lock()?;
    write_record(&conn, kind, id, payload, now, cache_duration)
  }

  fn upsert_all(
    &self,
    kind: EntityKind,
    payloads: &[Payload],
    now: DateTime<Utc>,
    cache_duration: Duration,
  ) -> Result<Vec<CachedEntity>> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    let mut written = Vec::with_capacity(payloads.len());
    for payload in payloads {
      let Some(id) = payload_id(payload) else {
        tracing::warn!(%kind, "skipping fetched entity without id");
        continue;
      };
      written.push(write_record(&tx, kind, &id, payload, now, cache_duration)?);
    }

    tx.commit()?;
    Ok(written)
  }

  fn query(&self, kind: EntityKind, filter: &CacheFilter) -> Result<Vec<CachedEntity>> {
    self.select(kind, filter, None)
  }

  fn query_unexpired(
    &self,
    kind: EntityKind,
    filter: &CacheFilter,
    now: DateTime<Utc>,
  ) -> Result<Vec<CachedEntity>> {
    self.select(kind, filter, Some(now))
  }

  fn get(&self, kind: EntityKind, id: &str) -> Result<Option<CachedEntity>> {
    let conn = self.lock()?;
    let sql = format!("{SELECT_COLUMNS} WHERE entity_kind = ?1 AND entity_id = ?2");
    let row = conn
      .query_row(&sql, params![kind.as_str(), id], raw_row)
      .optional()?;
    row.map(RawRow::into_entity).transpose()
  }

  fn count(&self, kind: EntityKind) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM entity_cache WHERE entity_kind = ?1",
      params![kind.as_str()],
      |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or_default())
  }
}
