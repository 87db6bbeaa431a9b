use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info, warn};

use tickmirror::cache::SqliteStore;
use tickmirror::config::Config;
use tickmirror::observe::{SyncObserver, TracingObserver};
use tickmirror::remote::{RemoteGateway, TickTickClient};
use tickmirror::sync::{CycleOutcome, SyncEngine, SyncReport, TaskSyncStatus};

#[derive(Parser, Debug)]
#[command(name = "tickmirror")]
#[command(about = "Mirror a TickTick account into a local SQLite cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tickmirror/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Only sync projects with these exact names (comma-separated)
  #[arg(short, long, value_delimiter = ',')]
  projects: Option<Vec<String>>,

  /// Path to the cache database
  #[arg(long)]
  db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?.apply_env();
  if let Some(projects) = args.projects {
    config.sync.projects = projects
      .into_iter()
      .map(|p| p.trim().to_string())
      .filter(|p| !p.is_empty())
      .collect();
  }
  if let Some(db) = args.db {
    config.store.path = Some(db);
  }

  let _guard = tickmirror::logging::init(config.logging.directory.as_deref())?;

  let store = match &config.store.path {
    Some(path) => SqliteStore::open_at(path)?,
    None => SqliteStore::open()?,
  };

  let token = Config::get_access_token()?;
  let client = TickTickClient::new(&config.remote.base_url, token, config.request_timeout())?;

  let observer: Arc<dyn SyncObserver> = Arc::new(TracingObserver);
  let gateway = RemoteGateway::new(
    Arc::new(client),
    config.rate_limiter(),
    config.retry_policy(),
    Arc::clone(&observer),
  );
  let engine = SyncEngine::new(gateway, Arc::new(store), config.sync_settings(), observer);
  info!(
    projects = ?engine.settings().project_allow_list,
    batch_size = engine.settings().batch_size,
    "starting sync"
  );

  let report = match engine.sync_all().await {
    Ok(report) => report,
    Err(e) if e.as_remote().is_none() => return Err(e.into()),
    Err(e) => {
      warn!(error = %e, "sync cycle failed, retrying once");
      engine.sync_all().await.map_err(|e| {
        error!(error = %e, "sync cycle failed again");
        eyre!("Sync failed: {}", e)
      })?
    }
  };

  log_report(&report);
  Ok(())
}

fn log_report(report: &SyncReport) {
  info!(
    source = ?report.projects.source,
    count = report.projects.count,
    "projects"
  );

  if let CycleOutcome::NoMatchingProjects { wanted } = &report.outcome {
    warn!(?wanted, "none of the requested projects exist");
    return;
  }

  for project in &report.tasks {
    let name = project.project_name.as_deref().unwrap_or(&project.project_id);
    match &project.status {
      TaskSyncStatus::Synced(sync) => {
        info!(project = name, source = ?sync.source, count = sync.count, "tasks")
      }
      TaskSyncStatus::Failed { error } => warn!(project = name, %error, "tasks not synced"),
    }
  }

  if let Some(notes) = &report.notes {
    info!(source = ?notes.source, count = notes.count, "notes");
  }
}
