use crate::cache::{CacheResult, CacheSource, CachedEntity};

/// Where one entity kind's data came from, and how much of it there was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSync {
  pub source: CacheSource,
  pub count: usize,
}

impl From<&CacheResult<Vec<CachedEntity>>> for KindSync {
  fn from(result: &CacheResult<Vec<CachedEntity>>) -> Self {
    Self {
      source: result.source,
      count: result.data.len(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSyncStatus {
  Synced(KindSync),
  /// The remote failed for this project; sibling projects were unaffected.
  Failed {
    error: String,
  },
}

/// Task sync outcome for one project of the working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTaskSync {
  pub project_id: String,
  pub project_name: Option<String>,
  pub status: TaskSyncStatus,
}

impl ProjectTaskSync {
  pub fn is_failed(&self) -> bool {
    matches!(self.status, TaskSyncStatus::Failed { .. })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
  Completed,
  /// The allow-list named projects that do not exist; no tasks were synced.
  NoMatchingProjects { wanted: Vec<String> },
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
  pub projects: KindSync,
  pub tasks: Vec<ProjectTaskSync>,
  pub notes: Option<KindSync>,
  pub outcome: CycleOutcome,
}

impl SyncReport {
  pub fn failed_projects(&self) -> impl Iterator<Item = &ProjectTaskSync> {
    self.tasks.iter().filter(|t| t.is_failed())
  }

  /// Number of scopes refreshed from the remote during the cycle.
  pub fn refreshed_scopes(&self) -> usize {
    let tasks = self
      .tasks
      .iter()
      .filter(|t| {
        matches!(
          t.status,
          TaskSyncStatus::Synced(KindSync {
            source: CacheSource::Network,
            ..
          })
        )
      })
      .count();
    usize::from(self.projects.source == CacheSource::Network) + tasks
  }
}
