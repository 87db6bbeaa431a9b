//! Notes are tasks carrying a note marker.

use serde_json::Value;

use crate::cache::{CachedEntity, Payload};

/// Task fields copied onto a derived note when present.
const CARRIED_FIELDS: [&str; 3] = ["projectId", "createdTime", "modifiedTime"];

/// Whether a task payload is a note: `kind: NOTE`, or the legacy `type: note`.
pub fn is_note(task: &Payload) -> bool {
  let marked = |field: &str| {
    task
      .get(field)
      .and_then(Value::as_str)
      .is_some_and(|v| v.eq_ignore_ascii_case("note"))
  };
  marked("kind") || marked("type")
}

/// Build the note payload for a cached task, if it is a note.
pub fn note_from_task(task: &CachedEntity) -> Option<Payload> {
  if !is_note(&task.payload) {
    return None;
  }

  let text = |field: &str| {
    task
      .str_field(field)
      .map(str::to_string)
      .unwrap_or_default()
  };

  let mut note = Payload::new();
  note.insert("id".into(), Value::String(task.id.clone()));
  note.insert("title".into(), Value::String(text("title")));
  note.insert("content".into(), Value::String(text("content")));
  for field in CARRIED_FIELDS {
    if let Some(value) = task.field(field) {
      note.insert(field.into(), value.clone());
    }
  }
  Some(note)
}

/// Notes among `tasks`, in order.
pub fn derive_notes(tasks: &[CachedEntity]) -> Vec<Payload> {
  tasks.iter().filter_map(note_from_task).collect()
}
