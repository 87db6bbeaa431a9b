//! Batch validity checks for cached entities.
//!
//! A batch is judged as a whole: one expired or incomplete record makes the
//! entire batch unusable and the caller refreshes every record of that scope.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::entity::{CachedEntity, EntityKind};

/// Why a batch was accepted or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
  Valid,
  Empty,
  Expired { id: String },
  MissingField { id: String, field: &'static str },
}

impl Verdict {
  pub fn is_valid(&self) -> bool {
    matches!(self, Self::Valid)
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Valid => f.write_str("valid"),
      Self::Empty => f.write_str("no cached entities"),
      Self::Expired { id } => write!(f, "entity {id} expired"),
      Self::MissingField { id, field } => write!(f, "entity {id} missing required field {field}"),
    }
  }
}

/// Judge a cached batch of `kind` at time `now`.
///
/// Expiry is checked across the whole batch before field completeness, so an
/// expired batch reports `Expired` even when it is also incomplete.
pub fn validate(items: &[CachedEntity], kind: EntityKind, now: DateTime<Utc>) -> Verdict {
  if items.is_empty() {
    return Verdict::Empty;
  }

  if let Some(item) = items.iter().find(|item| item.is_expired(now)) {
    return Verdict::Expired {
      id: item.id.clone(),
    };
  }

  for item in items {
    for &field in kind.required_fields() {
      if !has_field(item, field) {
        return Verdict::MissingField {
          id: item.id.clone(),
          field,
        };
      }
    }
  }

  Verdict::Valid
}

pub fn is_valid(items: &[CachedEntity], kind: EntityKind, now: DateTime<Utc>) -> bool {
  validate(items, kind, now).is_valid()
}

// A null counts as missing. The record id lives outside the payload.
fn has_field(item: &CachedEntity, field: &str) -> bool {
  if field == "id" && !item.id.is_empty() {
    return true;
  }
  !matches!(item.field(field), None | Some(Value::Null))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Payload;
  use chrono::Duration;
  use serde_json::json;

  fn entity(kind: EntityKind, id: &str, fields: Value, expires_in: Duration) -> CachedEntity {
    let now = Utc::now();
    let payload: Payload = match fields {
      Value::Object(map) => map,
      _ => panic!("expected an object"),
    };
    CachedEntity {
      kind,
      id: id.to_string(),
      payload,
      last_updated: now,
      cache_expiry: now + expires_in,
    }
  }

  fn task(id: &str) -> CachedEntity {
    entity(
      EntityKind::Task,
      id,
      json!({"id": id, "title": "Task", "projectId": "p1", "status": 0}),
      Duration::minutes(5),
    )
  }

  #[test]
  fn test_empty_batch_is_invalid() {
    assert_eq!(validate(&[], EntityKind::Task, Utc::now()), Verdict::Empty);
  }

  #[test]
  fn test_fresh_complete_batch_is_valid() {
    let items = vec![task("t1"), task("t2")];
    assert!(is_valid(&items, EntityKind::Task, Utc::now()));
  }

  #[test]
  fn test_dropping_a_required_field_flips_result() {
    for &field in EntityKind::Task.required_fields() {
      if field == "id" {
        continue;
      }
      let mut items = vec![task("t1"), task("t2")];
      items[1].payload.remove(field);
      assert_eq!(
        validate(&items, EntityKind::Task, Utc::now()),
        Verdict::MissingField {
          id: "t2".into(),
          field
        }
      );
    }
  }

  #[test]
  fn test_null_field_counts_as_missing() {
    let mut items = vec![task("t1")];
    items[0].payload.insert("title".into(), Value::Null);
    assert!(!is_valid(&items, EntityKind::Task, Utc::now()));
  }

  #[test]
  fn test_single_expired_item_invalidates_batch() {
    let mut items = vec![task("t1"), task("t2"), task("t3")];
    items[2].cache_expiry = Utc::now() - Duration::seconds(1);
    assert_eq!(
      validate(&items, EntityKind::Task, Utc::now()),
      Verdict::Expired { id: "t3".into() }
    );
  }

  #[test]
  fn test_expiry_equal_to_now_is_stale() {
    let now = Utc::now();
    let mut items = vec![task("t1")];
    items[0].cache_expiry = now;
    assert!(!is_valid(&items, EntityKind::Task, now));
  }

  #[test]
  fn test_required_fields_are_kind_specific() {
    let project = entity(
      EntityKind::Project,
      "p1",
      json!({"id": "p1", "name": "Work"}),
      Duration::hours(1),
    );
    assert!(is_valid(&[project.clone()], EntityKind::Project, Utc::now()));
    // A project lacks the title/content a note needs.
    assert!(!is_valid(&[project], EntityKind::Note, Utc::now()));

    let note = entity(
      EntityKind::Note,
      "n1",
      json!({"id": "n1", "title": "Idea", "content": ""}),
      Duration::minutes(5),
    );
    assert!(is_valid(&[note], EntityKind::Note, Utc::now()));
  }
}
