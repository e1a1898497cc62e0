//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Claim, ObserverError, Params, QueueCounts, QueueError, RunFinished, RunStarted,
    ScenarioError, ScenarioOutput, StoreOp, TaskId,
};
use crate::ports::{RunObserver, TaskDocument, TaskStore};
use crate::typed::{NamedScenario, Scenario};

/// Wraps a store and fails selected operations a given number of times.
pub(crate) struct FlakyStore<S> {
    inner: S,
    failures: Mutex<HashMap<StoreOp, u32>>,
}

impl<S: TaskStore> FlakyStore<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn fail_next(&self, op: StoreOp, times: u32) {
        self.failures.lock().unwrap().insert(op, times);
    }

    fn check(&self, op: StoreOp) -> Result<(), QueueError> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(QueueError::unavailable_msg(op, "connection refused"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<S: TaskStore> TaskStore for FlakyStore<S> {
    async fn insert(&self, doc: TaskDocument) -> Result<(), QueueError> {
        self.check(StoreOp::Insert)?;
        self.inner.insert(doc).await
    }

    async fn claim_one(&self, claim: Claim) -> Result<Option<TaskDocument>, QueueError> {
        self.check(StoreOp::Claim)?;
        self.inner.claim_one(claim).await
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, QueueError> {
        self.check(StoreOp::Delete)?;
        self.inner.delete(id).await
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskDocument>, QueueError> {
        self.check(StoreOp::Get)?;
        self.inner.get(id).await
    }

    async fn release_claimed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, QueueError> {
        self.check(StoreOp::Release)?;
        self.inner.release_claimed_before(cutoff).await
    }

    async fn list_claimed(&self) -> Result<Vec<TaskDocument>, QueueError> {
        self.check(StoreOp::List)?;
        self.inner.list_claimed().await
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.check(StoreOp::Count)?;
        self.inner.counts().await
    }
}

/// Keeps every event it receives.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub(crate) started: Mutex<Vec<RunStarted>>,
    pub(crate) finished: Mutex<Vec<RunFinished>>,
}

impl RecordingObserver {
    pub(crate) fn finished_runs(&self) -> Vec<RunFinished> {
        self.finished.lock().unwrap().clone()
    }

    pub(crate) fn started_runs(&self) -> Vec<RunStarted> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunObserver for RecordingObserver {
    async fn started(&self, run: &RunStarted) -> Result<(), ObserverError> {
        self.started.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn finished(&self, run: &RunFinished) -> Result<(), ObserverError> {
        self.finished.lock().unwrap().push(run.clone());
        Ok(())
    }
}

/// Rejects everything.
pub(crate) struct BrokenObserver;

#[async_trait]
impl RunObserver for BrokenObserver {
    async fn started(&self, _run: &RunStarted) -> Result<(), ObserverError> {
        Err(ObserverError::new("broken", "tracking server is down"))
    }

    async fn finished(&self, _run: &RunFinished) -> Result<(), ObserverError> {
        Err(ObserverError::new("broken", "tracking server is down"))
    }
}

/// Panics on every event.
pub(crate) struct PanickingObserver;

#[async_trait]
impl RunObserver for PanickingObserver {
    async fn started(&self, _run: &RunStarted) -> Result<(), ObserverError> {
        panic!("tracking client lost its session");
    }

    async fn finished(&self, _run: &RunFinished) -> Result<(), ObserverError> {
        panic!("tracking client lost its session");
    }
}

/// Returns its whole config as the result value.
pub(crate) struct EchoScenario;

impl Scenario for EchoScenario {
    fn single_run(&self, config: &Params) -> Result<ScenarioOutput, ScenarioError> {
        Ok(ScenarioOutput::new(serde_json::Value::Object(config.clone())))
    }
}

impl NamedScenario for EchoScenario {
    const NAME: &'static str = "echo";
    type Params = serde_json::Value;

    fn from_params(_params: Self::Params) -> Result<Self, ScenarioError> {
        Ok(EchoScenario)
    }
}

/// Always fails with the configured message.
pub(crate) struct FailingScenario {
    message: String,
}

#[derive(serde::Deserialize)]
pub(crate) struct FailingParams {
    #[serde(default = "default_failure")]
    message: String,
}

fn default_failure() -> String {
    "loss is NaN".to_string()
}

impl Scenario for FailingScenario {
    fn single_run(&self, _config: &Params) -> Result<ScenarioOutput, ScenarioError> {
        Err(ScenarioError::failed(self.message.clone()))
    }
}

impl NamedScenario for FailingScenario {
    const NAME: &'static str = "fail";
    type Params = FailingParams;

    fn from_params(params: Self::Params) -> Result<Self, ScenarioError> {
        Ok(FailingScenario {
            message: params.message,
        })
    }
}

/// Panics inside `single_run`.
pub(crate) struct PanickingScenario;

impl Scenario for PanickingScenario {
    fn single_run(&self, _config: &Params) -> Result<ScenarioOutput, ScenarioError> {
        panic!("index out of range in attention head");
    }
}

impl NamedScenario for PanickingScenario {
    const NAME: &'static str = "panic";
    type Params = serde_json::Value;

    fn from_params(_params: Self::Params) -> Result<Self, ScenarioError> {
        Ok(PanickingScenario)
    }
}
