use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::notes::derive_notes;
use super::report::{CycleOutcome, KindSync, ProjectTaskSync, SyncReport, TaskSyncStatus};
use crate::cache::{
  payload_id, CacheFilter, CacheLayer, CacheResult, CacheSource, CacheStore, CachedEntity,
  EntityKind, Payload,
};
use crate::error::{Error, Result};
use crate::observe::{SyncEvent, SyncObserver};
use crate::remote::{NewProject, NewTask, RemoteGateway};

/// Tunables for one [`SyncEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
  pub project_ttl: chrono::Duration,
  pub task_ttl: chrono::Duration,
  pub note_ttl: chrono::Duration,
  /// Exact project names to sync; empty means every project.
  pub project_allow_list: Vec<String>,
  /// Projects whose tasks are synced between two pauses.
  pub batch_size: usize,
  pub batch_pause: Duration,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      project_ttl: chrono::Duration::hours(1),
      task_ttl: chrono::Duration::minutes(5),
      note_ttl: chrono::Duration::minutes(5),
      project_allow_list: Vec::new(),
      batch_size: 5,
      batch_pause: Duration::from_secs(5),
    }
  }
}

/// Drives sync cycles: projects first, then the working set's tasks, then notes.
///
/// Remote calls are issued one at a time through the gateway; the engine never
/// runs two fetches concurrently.
pub struct SyncEngine<S: CacheStore> {
  remote: RemoteGateway,
  cache: CacheLayer<S>,
  settings: SyncSettings,
  observer: Arc<dyn SyncObserver>,
}

impl<S: CacheStore> SyncEngine<S> {
  pub fn new(
    remote: RemoteGateway,
    store: Arc<S>,
    settings: SyncSettings,
    observer: Arc<dyn SyncObserver>,
  ) -> Self {
    Self {
      remote,
      cache: CacheLayer::new(store, Arc::clone(&observer)),
      settings,
      observer,
    }
  }

  pub fn settings(&self) -> &SyncSettings {
    &self.settings
  }

  pub fn store(&self) -> &S {
    self.cache.store()
  }

  /// Whatever is stored for `kind`, fresh or not. Never touches the remote.
  pub fn cached(&self, kind: EntityKind, filter: &CacheFilter) -> Result<Vec<CachedEntity>> {
    self.store().query(kind, filter)
  }

  /// Run one full cycle.
  ///
  /// Fails only when project sync or the store fails; a failing project's
  /// task sync is reported in the returned [`SyncReport`] instead.
  #[instrument(skip(self))]
  pub async fn sync_all(&self) -> Result<SyncReport> {
    let projects = self.sync_projects().await?;
    let project_sync = KindSync::from(&projects);

    let Some(working_set) = self.filter_projects(&projects.data) else {
      let wanted = self.settings.project_allow_list.clone();
      warn!(?wanted, "no project matches the configured allow-list, skipping task sync");
      return Ok(SyncReport {
        projects: project_sync,
        tasks: Vec::new(),
        notes: None,
        outcome: CycleOutcome::NoMatchingProjects { wanted },
      });
    };

    let (tasks, synced) = self.sync_tasks_collecting(&working_set).await?;
    let notes = self.sync_notes(&synced).await?;

    let report = SyncReport {
      projects: project_sync,
      tasks,
      notes: Some(KindSync::from(&notes)),
      outcome: CycleOutcome::Completed,
    };
    info!(
      projects = report.projects.count,
      failed = report.failed_projects().count(),
      refreshed = report.refreshed_scopes(),
      "sync cycle finished"
    );
    Ok(report)
  }

  pub async fn sync_projects(&self) -> Result<CacheResult<Vec<CachedEntity>>> {
    self
      .cache
      .fetch_batch(
        EntityKind::Project,
        &CacheFilter::all(),
        self.settings.project_ttl,
        || self.remote.fetch_projects(),
      )
      .await
  }

  /// Restrict `projects` to the allow-list.
  ///
  /// Returns `None` when an allow-list is configured and nothing matches it.
  pub fn filter_projects(&self, projects: &[CachedEntity]) -> Option<Vec<CachedEntity>> {
    let allow = &self.settings.project_allow_list;
    if allow.is_empty() {
      return Some(projects.to_vec());
    }

    let selected: Vec<CachedEntity> = projects
      .iter()
      .filter(|p| p.name().is_some_and(|name| allow.iter().any(|a| a == name)))
      .cloned()
      .collect();

    if selected.is_empty() {
      None
    } else {
      Some(selected)
    }
  }

  /// Sync one project's tasks through the cache.
  pub async fn sync_project_tasks(
    &self,
    project_id: &str,
  ) -> Result<CacheResult<Vec<CachedEntity>>> {
    self
      .cache
      .fetch_batch(
        EntityKind::Task,
        &CacheFilter::project(project_id),
        self.settings.task_ttl,
        || async move {
          let mut tasks = self.remote.fetch_tasks_for_project(project_id).await?;
          for task in &mut tasks {
            ensure_project_id(task, project_id);
          }
          Ok::<_, Error>(tasks)
        },
      )
      .await
  }

  /// Sync the tasks of every project in `projects`, in batches.
  pub async fn sync_tasks(&self, projects: &[CachedEntity]) -> Result<Vec<ProjectTaskSync>> {
    let (report, _) = self.sync_tasks_collecting(projects).await?;
    Ok(report)
  }

  async fn sync_tasks_collecting(
    &self,
    projects: &[CachedEntity],
  ) -> Result<(Vec<ProjectTaskSync>, Vec<CachedEntity>)> {
    let mut report = Vec::with_capacity(projects.len());
    let mut synced = Vec::new();
    let batches: Vec<&[CachedEntity]> = projects.chunks(self.settings.batch_size.max(1)).collect();

    for (index, batch) in batches.iter().enumerate() {
      let mut touched_remote = false;

      for project in batch.iter() {
        let status = match self.sync_project_tasks(&project.id).await {
          Ok(result) => {
            touched_remote |= result.source == CacheSource::Network;
            let status = TaskSyncStatus::Synced(KindSync::from(&result));
            synced.extend(result.data);
            status
          }
          Err(e) if e.is_store_failure() => return Err(e),
          Err(e) => {
            touched_remote = true;
            error!(project_id = %project.id, error = %e, "task sync failed for project");
            self.observer.record(SyncEvent::ScopeFailed {
              kind: EntityKind::Task,
              scope: CacheFilter::project(project.id.as_str()).scope(),
              error: e.to_string(),
            });
            TaskSyncStatus::Failed {
              error: e.to_string(),
            }
          }
        };

        report.push(ProjectTaskSync {
          project_id: project.id.clone(),
          project_name: project.name().map(str::to_string),
          status,
        });
      }

      let more = index + 1 < batches.len();
      if more && touched_remote && !self.settings.batch_pause.is_zero() {
        debug!(pause = ?self.settings.batch_pause, "pausing between task batches");
        tokio::time::sleep(self.settings.batch_pause).await;
      }
    }

    Ok((report, synced))
  }

  /// Sync notes, deriving them from `tasks` when the cached notes are unusable.
  pub async fn sync_notes(&self, tasks: &[CachedEntity]) -> Result<CacheResult<Vec<CachedEntity>>> {
    self
      .cache
      .fetch_batch(
        EntityKind::Note,
        &CacheFilter::all(),
        self.settings.note_ttl,
        || async { Ok::<_, Error>(derive_notes(tasks)) },
      )
      .await
  }

  /// Fetch one task from the remote and store it.
  pub async fn fetch_task(&self, project_id: &str, task_id: &str) -> Result<CachedEntity> {
    let mut task = self.remote.fetch_task(project_id, task_id).await?;
    ensure_project_id(&mut task, project_id);
    self.write_one(EntityKind::Task, task, self.settings.task_ttl)
  }

  /// Create a task remotely and store what the service returns.
  pub async fn create_task(&self, task: &NewTask) -> Result<CachedEntity> {
    let mut created = self.remote.create_task(task).await?;
    ensure_project_id(&mut created, &task.project_id);
    self.write_one(EntityKind::Task, created, self.settings.task_ttl)
  }

  /// Create a project remotely and store what the service returns.
  pub async fn create_project(&self, project: &NewProject) -> Result<CachedEntity> {
    let created = self.remote.create_project(project).await?;
    self.write_one(EntityKind::Project, created, self.settings.project_ttl)
  }

  fn write_one(
    &self,
    kind: EntityKind,
    payload: Payload,
    ttl: chrono::Duration,
  ) -> Result<CachedEntity> {
    let missing = Error::MissingId {
      kind: kind.as_str(),
    };
    let Some(id) = payload_id(&payload) else {
      return Err(missing);
    };
    let written = self.cache.write_through(kind, &id, &[payload], ttl)?;
    written.into_iter().next().ok_or(missing)
  }
}

/// The task listing omits `projectId` on some accounts; the owning project is known.
fn ensure_project_id(task: &mut Payload, project_id: &str) {
  let present = task
    .get("projectId")
    .and_then(Value::as_str)
    .is_some_and(|id| !id.is_empty());
  if !present {
    task.insert("projectId".into(), Value::String(project_id.to_string()));
  }
}
