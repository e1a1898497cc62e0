//! TaskQueue: the claim / fetch / remove protocol on top of a `TaskStore`.
//!
//! Every write to the store goes through here. Workers only ever call
//! `fetch_one` and `remove`; producers call `enqueue`; operators call
//! `claimed` and `reclaim_stale`.

mod document;
mod retry;

pub use retry::RetryPolicy;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::domain::{Claim, NewTask, QueueCounts, QueueError, Task, TaskId, WorkerId};
use crate::ports::{Clock, IdGenerator, SystemClock, TaskDocument, TaskStore, UlidGenerator};

/// A claimed-but-not-removed task, as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimedTask {
    pub id: TaskId,
    pub name: Option<String>,
    pub worker: WorkerId,
    pub claimed_at: DateTime<Utc>,
}

pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    tasks_dir: PathBuf,
    worker: WorkerId,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>, tasks_dir: impl Into<PathBuf>, worker: WorkerId) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store,
            tasks_dir: tasks_dir.into(),
            worker,
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// Replace the clock (and the id generator built on it).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        self.clock = clock;
        self
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ids(&self) -> &Arc<dyn IdGenerator> {
        &self.ids
    }

    /// Claim one unclaimed task. `Ok(None)` means the queue is empty.
    ///
    /// A claimed document that does not decode can never run: it is logged
    /// and deleted, and the next document is tried.
    pub async fn fetch_one(&self) -> Result<Option<Task>, QueueError> {
        loop {
            let claim = Claim::new(self.worker.clone(), self.clock.now());
            let Some(doc) = self.store.claim_one(claim).await? else {
                return Ok(None);
            };

            match document::decode_task(&doc, &self.tasks_dir) {
                Ok(task) => {
                    debug!(task_id = %task.id(), worker_id = %self.worker, name = task.name(), "claimed task");
                    return Ok(Some(task));
                }
                Err(err) => {
                    error!(
                        task_id = %doc.id,
                        error = %err,
                        document = %serde_json::Value::Object(doc.body.clone()),
                        "dropping malformed task document"
                    );
                    self.store.delete(&doc.id).await?;
                }
            }
        }
    }

    /// Delete the task's document. Removing an already removed task is fine.
    pub async fn remove(&self, task: &Task) -> Result<(), QueueError> {
        self.remove_id(task.id()).await
    }

    pub async fn remove_id(&self, id: &TaskId) -> Result<(), QueueError> {
        if self.store.delete(id).await? {
            debug!(task_id = %id, "removed task");
        } else {
            debug!(task_id = %id, "task already removed");
        }
        Ok(())
    }

    /// Producer side: insert a new unclaimed task under a fresh id.
    pub async fn enqueue(&self, task: NewTask) -> Result<TaskId, QueueError> {
        let id = self.ids.generate_task_id();
        self.enqueue_with_id(id, task).await
    }

    /// Insert under a caller chosen id; `DuplicateTask` if it already exists.
    pub async fn enqueue_with_id(&self, id: TaskId, task: NewTask) -> Result<TaskId, QueueError> {
        let body = document::encode_task(&task);
        self.store
            .insert(TaskDocument::unclaimed(id.clone(), body))
            .await?;
        debug!(task_id = %id, name = %task.name, "enqueued task");
        Ok(id)
    }

    /// Release claims held for at least `older_than` back to the unclaimed set.
    ///
    /// Use this for tasks whose worker died between `fetch_one` and `remove`.
    /// A zero duration releases every claim.
    pub async fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<TaskId>, QueueError> {
        let now = self.clock.now();
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let released = self.store.release_claimed_before(cutoff).await?;
        if !released.is_empty() {
            info!(count = released.len(), cutoff = %cutoff, "released stale claims");
        }
        Ok(released)
    }

    pub async fn claimed(&self) -> Result<Vec<ClaimedTask>, QueueError> {
        let docs = self.store.list_claimed().await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| {
                let claim = doc.claim?;
                Some(ClaimedTask {
                    name: doc
                        .body
                        .get("name")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    id: doc.id,
                    worker: claim.worker,
                    claimed_at: claim.claimed_at,
                })
            })
            .collect())
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.store.counts().await
    }

    /// Whether the store still holds a document for this id.
    pub async fn contains(&self, id: &TaskId) -> Result<bool, QueueError> {
        Ok(self.store.get(id).await?.is_some())
    }
}
