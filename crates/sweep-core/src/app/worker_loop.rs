//! WorkerLoop - fetch, execute, report, remove. Forever, one task at a time.
//!
//! ```text
//! Idle --fetch_one: None--> Sleeping --sleep_time--> Idle
//! Idle --fetch_one: Task--> Executing -> Reporting -> Cleanup -> Idle
//! ```
//!
//! Cleanup runs for every fetched task no matter how execution or reporting
//! went. Only a store outage during `fetch_one` is handled at loop level
//! (backoff, then Idle again).

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::{
    ObserverError, QueueError, RunFinished, RunId, RunStarted, RunStatus, Task, TaskId,
};
use crate::ports::RunObserver;
use crate::queue::TaskQueue;

use super::config::WorkerConfig;
use super::runtime::{Runtime, panic_message};
use super::shutdown::{sleep_or_stop, stop_requested};

/// What one `run_once` did.
#[derive(Debug)]
pub enum Iteration {
    Processed(ProcessedTask),
    Empty,
    StoreUnavailable(QueueError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTask {
    pub task_id: TaskId,
    pub run_id: RunId,
    pub status: RunStatus,
    /// `false` when every remove attempt failed; the claim is then left for
    /// an operator or the reaper.
    pub removed: bool,
}

/// Counters returned by `run` when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub remove_failures: u64,
    pub empty_polls: u64,
    pub store_errors: u64,
}

impl WorkerStats {
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    fn record(&mut self, task: &ProcessedTask) {
        match task.status {
            RunStatus::Completed => self.completed += 1,
            RunStatus::Failed => self.failed += 1,
        }
        if !task.removed {
            self.remove_failures += 1;
        }
    }
}

pub struct WorkerLoop {
    queue: Arc<TaskQueue>,
    runtime: Arc<Runtime>,
    observer: Arc<dyn RunObserver>,
    config: WorkerConfig,
}

impl WorkerLoop {
    pub fn new(
        queue: Arc<TaskQueue>,
        runtime: Arc<Runtime>,
        observer: Arc<dyn RunObserver>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            runtime,
            observer,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until a stop is signalled (or, with `exit_when_empty`, until the
    /// queue is empty). A task fetched before the stop is finished and removed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let worker_id = self.queue.worker().clone();
        let mut stats = WorkerStats::default();
        let mut store_failures: u32 = 0;

        info!(worker_id = %worker_id, tasks_dir = %self.config.tasks_dir.display(), "worker started");

        loop {
            if stop_requested(&shutdown) {
                break;
            }

            match self.run_once().await {
                Iteration::Processed(task) => {
                    store_failures = 0;
                    stats.record(&task);
                }
                Iteration::Empty => {
                    store_failures = 0;
                    stats.empty_polls += 1;
                    if self.config.exit_when_empty {
                        info!(worker_id = %worker_id, "queue is empty, exiting");
                        break;
                    }
                    info!(
                        worker_id = %worker_id,
                        sleep_secs = self.config.sleep_time.as_secs_f64(),
                        "No available tasks in the queue. Sleeping."
                    );
                    if !sleep_or_stop(self.config.sleep_time, &mut shutdown).await {
                        break;
                    }
                }
                Iteration::StoreUnavailable(err) => {
                    store_failures = store_failures.saturating_add(1);
                    stats.store_errors += 1;
                    let delay = self.config.store_backoff.next_delay(store_failures);
                    warn!(
                        worker_id = %worker_id,
                        error = %err,
                        attempt = store_failures,
                        delay_ms = delay.as_millis() as u64,
                        "task store unavailable, backing off"
                    );
                    if !sleep_or_stop(delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(
            worker_id = %worker_id,
            completed = stats.completed,
            failed = stats.failed,
            remove_failures = stats.remove_failures,
            "worker stopped"
        );
        stats
    }

    /// One Idle step: fetch, and if a task came back, process it fully.
    pub async fn run_once(&self) -> Iteration {
        match self.queue.fetch_one().await {
            Ok(Some(task)) => Iteration::Processed(self.process(task).await),
            Ok(None) => Iteration::Empty,
            Err(err) => Iteration::StoreUnavailable(err),
        }
    }

    async fn process(&self, task: Task) -> ProcessedTask {
        let run_id = self.queue.ids().generate_run_id();
        let prepared = self.runtime.prepare(&task).await;

        let started = RunStarted {
            run_id,
            name: task.name().to_string(),
            task_id: task.id().clone(),
            worker: self.queue.worker().clone(),
            config: match &prepared {
                Ok(config) => config.clone(),
                Err(_) => task.params().clone(),
            },
            started_at: self.queue.clock().now(),
        };
        info!(task_id = %task.id(), run_id = %run_id, name = task.name(), "executing task");
        if let Err(err) = guarded("started", self.observer.started(&started)).await {
            warn!(task_id = %task.id(), run_id = %run_id, error = %err, "observer rejected run start");
        }

        let outcome = match prepared {
            Ok(config) => self.runtime.execute(task.name(), config).await,
            Err(failure) => Err(failure),
        };

        let stopped_at = self.queue.clock().now();
        let finished = match outcome {
            Ok(output) => {
                info!(
                    task_id = %task.id(),
                    run_id = %run_id,
                    result = %output.value,
                    "run completed"
                );
                RunFinished::completed(&started, output, stopped_at)
            }
            Err(failure) => {
                let detail = failure.detail();
                error!(
                    task_id = %task.id(),
                    run_id = %run_id,
                    kind = ?detail.kind,
                    error = %failure,
                    chain = ?detail.chain,
                    trace = detail.trace.as_deref().unwrap_or(""),
                    "run failed"
                );
                RunFinished::failed(&started, detail, stopped_at)
            }
        };
        if let Err(err) = guarded("finished", self.observer.finished(&finished)).await {
            warn!(task_id = %task.id(), run_id = %run_id, error = %err, "observer rejected run result");
        }

        let removed = self.cleanup(&task).await;
        ProcessedTask {
            task_id: task.id().clone(),
            run_id,
            status: finished.status,
            removed,
        }
    }

    async fn cleanup(&self, task: &Task) -> bool {
        let attempts = self.config.remove_attempts.max(1);
        for attempt in 1..=attempts {
            match self.queue.remove(task).await {
                Ok(()) => {
                    debug!(task_id = %task.id(), attempt, "task cleaned up");
                    return true;
                }
                Err(err) if attempt < attempts => {
                    let delay = self.config.store_backoff.next_delay(attempt);
                    warn!(
                        task_id = %task.id(),
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "remove failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        task_id = %task.id(),
                        attempts,
                        error = %err,
                        "giving up on removing task, claim stays in the store"
                    );
                }
            }
        }
        false
    }
}

/// Runs an observer call; a panic in it becomes an `ObserverError`.
async fn guarded<F>(event: &str, call: F) -> Result<(), ObserverError>
where
    F: Future<Output = Result<(), ObserverError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ObserverError::new(
            "observer",
            format!("panicked in {event}: {}", panic_message(payload)),
        )),
    }
}
