//! Local mirror of remote entities.
//!
//! This module provides the cache half of the sync core:
//! - One record per `(kind, id)` holding the untyped remote payload
//! - `last_updated` / `cache_expiry` stamps set on every write-through
//! - All-or-nothing batch validation (empty, expired, incomplete)
//! - A cache-first layer that refetches rejected batches

mod entity;
mod layer;
mod storage;
pub mod validator;

pub use entity::{payload_id, CacheResult, CacheSource, CachedEntity, EntityKind, Payload};
pub use layer::CacheLayer;
pub use storage::{CacheFilter, CacheStore, SqliteStore};
pub use validator::Verdict;
