//! Sync cycle orchestration: projects, then each project's tasks, then notes.

mod engine;
mod notes;
mod report;

pub use engine::{SyncEngine, SyncSettings};
pub use notes::{derive_notes, is_note, note_from_task};
pub use report::{CycleOutcome, KindSync, ProjectTaskSync, SyncReport, TaskSyncStatus};
