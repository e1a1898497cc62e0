//! What each command does once the arguments are parsed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::watch;
use tracing::{info, warn};

use sweep_core::app::{ReaperLoop, StoreConfig, WorkerBuilder, WorkerConfig, context};
use sweep_core::domain::{NewTask, WorkerId};
use sweep_core::impls::{MongoObserver, MongoTaskStore, ObserverSet, TracingObserver};
use sweep_core::ports::TaskStore;
use sweep_core::queue::TaskQueue;

use crate::args::WorkerArgs;
use crate::scenarios;

const DESCRIPTION_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

async fn connect(config: &StoreConfig) -> Result<MongoTaskStore> {
    MongoTaskStore::connect(config)
        .await
        .with_context(|| format!("connecting to {}", config.normalized_uri()))
}

/// A queue for producer and operator commands (no tasks dir involved).
async fn operator_queue(config: &StoreConfig) -> Result<TaskQueue> {
    let store = connect(config).await?;
    Ok(TaskQueue::new(Arc::new(store), ".", WorkerId::new("sweep-cli")))
}

pub async fn work(args: WorkerArgs) -> Result<()> {
    let (Some(tasks_dir), Some(db_name)) = (args.tasks_dir, args.db_name) else {
        bail!("TASKS_DIR and DB_NAME are required to run a worker");
    };
    let tasks_dir = resolve_tasks_dir(&tasks_dir)?;

    let store = connect(&args.store.config(&db_name)).await?;
    let observer = ObserverSet::new()
        .with(Arc::new(TracingObserver::new()))
        .with(Arc::new(MongoObserver::new(store.database())));
    let store: Arc<dyn TaskStore> = Arc::new(store);

    let config = WorkerConfig::new(tasks_dir)
        .with_sleep_time(Duration::from_secs(args.sleep_time))
        .with_remove_attempts(args.remove_attempts)
        .with_exit_when_empty(args.exit_when_empty);
    let worker_id = args
        .worker_id
        .map(WorkerId::new)
        .unwrap_or_else(WorkerId::generate);

    let worker = WorkerBuilder::new(config)
        .registry(scenarios::registry()?)
        .observer(Arc::new(observer))
        .build(store, worker_id)?;

    let (tx, rx) = watch::channel(false);

    let reaper = args.reclaim_after.map(|secs| {
        let reaper = ReaperLoop::new(Arc::clone(worker.queue()), Duration::from_secs(secs));
        info!(lease_secs = secs, interval_secs = reaper.interval().as_secs(), "reaper enabled");
        let rx = rx.clone();
        tokio::spawn(async move { reaper.run(rx).await })
    });

    let mut worker_task = tokio::spawn(async move { worker.run(rx).await });
    let stats = tokio::select! {
        joined = &mut worker_task => joined?,
        _ = stop_signal() => {
            info!("stop requested, finishing the current task");
            let _ = tx.send(true);
            worker_task.await?
        }
    };

    let _ = tx.send(true);
    if let Some(reaper) = reaper {
        let released = reaper.await?;
        info!(released, "reaper stopped");
    }
    info!(
        completed = stats.completed,
        failed = stats.failed,
        remove_failures = stats.remove_failures,
        "done"
    );
    Ok(())
}

/// Absolute, symlink-free path of an existing directory.
fn resolve_tasks_dir(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        bail!("tasks dir {} is not a directory", path.display());
    }
    path.canonicalize()
        .with_context(|| format!("resolving {}", path.display()))
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn stop_signal() {
    tokio::select! {
        _ = interrupt() => info!(signal = "SIGINT", "received stop signal"),
        _ = terminate() => info!(signal = "SIGTERM", "received stop signal"),
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

pub async fn enqueue(
    tasks_dir: &Path,
    store: &StoreConfig,
    files: Vec<PathBuf>,
    set: Vec<(String, serde_json::Value)>,
) -> Result<()> {
    let tasks_dir = resolve_tasks_dir(tasks_dir)?;
    let files = if files.is_empty() {
        discover(&tasks_dir)?
    } else {
        files.into_iter().map(|f| tasks_dir.join(f)).collect()
    };
    if files.is_empty() {
        bail!("no description files found in {}", tasks_dir.display());
    }

    // every file must parse before anything is written
    let mut tasks = Vec::with_capacity(files.len());
    for file in &files {
        context::load_description(file).await?;
        tasks.push(new_task(&tasks_dir, file, &set)?);
    }

    let queue = operator_queue(store).await?;
    for task in tasks {
        let name = task.name.clone();
        let id = queue.enqueue(task).await?;
        println!("{id}\t{name}");
    }
    Ok(())
}

/// Description files directly inside `dir`, sorted by name.
fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_description = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| DESCRIPTION_EXTENSIONS.contains(&e));
        if path.is_file() && is_description {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Name from the file stem; the path is stored relative to `tasks_dir` when
/// the file lives under it, so workers with another mount point still find it.
fn new_task(tasks_dir: &Path, file: &Path, set: &[(String, serde_json::Value)]) -> Result<NewTask> {
    let name = file
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("no usable file name in {}", file.display()))?;
    let stored = file.strip_prefix(tasks_dir).unwrap_or(file);

    let mut task = NewTask::new(name, stored.to_string_lossy());
    for (key, value) in set {
        task = task.with_param(key.clone(), value.clone());
    }
    Ok(task)
}

pub async fn status(store: &StoreConfig, json: bool) -> Result<()> {
    let counts = operator_queue(store).await?.counts().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("unclaimed: {}", counts.unclaimed);
        println!("claimed:   {}", counts.claimed);
    }
    Ok(())
}

pub async fn claimed(store: &StoreConfig, json: bool) -> Result<()> {
    let claimed = operator_queue(store).await?.claimed().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&claimed)?);
        return Ok(());
    }
    println!("Claimed tasks ({})", claimed.len());
    for task in claimed {
        println!(
            "  {} | {} | {} | {}",
            task.id,
            task.name.as_deref().unwrap_or("-"),
            task.worker,
            task.claimed_at.to_rfc3339()
        );
    }
    Ok(())
}

pub async fn reclaim(store: &StoreConfig, older_than: u64) -> Result<()> {
    let released = operator_queue(store)
        .await?
        .reclaim_stale(Duration::from_secs(older_than))
        .await?;
    println!("released {} claim(s)", released.len());
    for id in released {
        println!("  {id}");
    }
    Ok(())
}
