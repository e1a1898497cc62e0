//! Observers that need no external service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{ObserverError, RunFinished, RunStarted, RunStatus};
use crate::ports::RunObserver;

/// Writes runs to the log. The default observer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RunObserver for TracingObserver {
    async fn started(&self, run: &RunStarted) -> Result<(), ObserverError> {
        info!(
            run_id = %run.run_id,
            task_id = %run.task_id,
            worker_id = %run.worker,
            name = %run.name,
            config = %serde_json::Value::Object(run.config.clone()),
            "run started"
        );
        Ok(())
    }

    async fn finished(&self, run: &RunFinished) -> Result<(), ObserverError> {
        let elapsed_ms = (run.stopped_at - run.started_at).num_milliseconds();
        match run.status {
            RunStatus::Completed => info!(
                run_id = %run.run_id,
                task_id = %run.task_id,
                status = ?run.status,
                elapsed_ms,
                result = %run.result.clone().unwrap_or_default(),
                info = %serde_json::Value::Object(run.info.clone()),
                "run finished"
            ),
            RunStatus::Failed => warn!(
                run_id = %run.run_id,
                task_id = %run.task_id,
                status = ?run.status,
                elapsed_ms,
                failure = run.failure.as_ref().map(|f| f.message.as_str()).unwrap_or(""),
                "run finished"
            ),
        }
        Ok(())
    }
}

/// Fans every event out to all members. A failing member does not stop the
/// others; the failures are combined into one error.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn combine(errors: Vec<ObserverError>) -> Result<(), ObserverError> {
        if errors.is_empty() {
            return Ok(());
        }
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(ObserverError::new("observer-set", message))
    }
}

#[async_trait]
impl RunObserver for ObserverSet {
    async fn started(&self, run: &RunStarted) -> Result<(), ObserverError> {
        let mut errors = Vec::new();
        for observer in &self.observers {
            if let Err(e) = observer.started(run).await {
                errors.push(e);
            }
        }
        Self::combine(errors)
    }

    async fn finished(&self, run: &RunFinished) -> Result<(), ObserverError> {
        let mut errors = Vec::new();
        for observer in &self.observers {
            if let Err(e) = observer.finished(run).await {
                errors.push(e);
            }
        }
        Self::combine(errors)
    }
}
