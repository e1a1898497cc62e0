//! Multi-worker behaviour of the queue protocol, through the public API only.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use sweep_core::app::{Iteration, WorkerBuilder, WorkerConfig, WorkerLoop};
use sweep_core::domain::{
    FailureKind, NewTask, ObserverError, Params, QueueCounts, RunFinished, RunStarted, RunStatus,
    ScenarioError, ScenarioOutput, WorkerId,
};
use sweep_core::impls::InMemoryTaskStore;
use sweep_core::ports::{RunObserver, TaskStore};
use sweep_core::queue::{RetryPolicy, TaskQueue};
use sweep_core::typed::{NamedScenario, Scenario};

struct Accuracy;

impl Scenario for Accuracy {
    fn single_run(&self, config: &Params) -> Result<ScenarioOutput, ScenarioError> {
        let lr = config
            .get("lr")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ScenarioError::failed("lr missing"))?;
        if lr > 1.0 {
            return Err(ScenarioError::failed("training diverged"));
        }
        Ok(ScenarioOutput::new(json!(1.0 - lr)).with_info("epochs", json!(2)))
    }
}

impl NamedScenario for Accuracy {
    const NAME: &'static str = "accuracy";
    type Params = serde_json::Value;

    fn from_params(_params: serde_json::Value) -> Result<Self, ScenarioError> {
        Ok(Accuracy)
    }
}

struct Crash;

impl Scenario for Crash {
    fn single_run(&self, _config: &Params) -> Result<ScenarioOutput, ScenarioError> {
        panic!("segfault in data loader");
    }
}

impl NamedScenario for Crash {
    const NAME: &'static str = "crash";
    type Params = serde_json::Value;

    fn from_params(_params: serde_json::Value) -> Result<Self, ScenarioError> {
        Ok(Crash)
    }
}

#[derive(Default)]
struct Recorder {
    finished: Mutex<Vec<RunFinished>>,
    fail_all: bool,
}

#[async_trait]
impl RunObserver for Recorder {
    async fn started(&self, _run: &RunStarted) -> Result<(), ObserverError> {
        if self.fail_all {
            return Err(ObserverError::new("recorder", "offline"));
        }
        Ok(())
    }

    async fn finished(&self, run: &RunFinished) -> Result<(), ObserverError> {
        self.finished.lock().unwrap().push(run.clone());
        if self.fail_all {
            return Err(ObserverError::new("recorder", "offline"));
        }
        Ok(())
    }
}

struct Setup {
    dir: tempfile::TempDir,
    store: Arc<dyn TaskStore>,
}

impl Setup {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.json"), r#"{"scenario": "accuracy"}"#).unwrap();
        std::fs::write(dir.path().join("crash.yaml"), "scenario: crash\n").unwrap();
        Self {
            dir,
            store: Arc::new(InMemoryTaskStore::new()),
        }
    }

    fn producer(&self) -> TaskQueue {
        TaskQueue::new(Arc::clone(&self.store), self.dir.path(), WorkerId::new("producer"))
    }

    fn worker(&self, id: &str, observer: Arc<dyn RunObserver>) -> WorkerLoop {
        let config = WorkerConfig::new(self.dir.path())
            .with_sleep_time(Duration::from_secs(30))
            .with_store_backoff(RetryPolicy::constant(Duration::from_millis(5)));
        WorkerBuilder::new(config)
            .register::<Accuracy>()
            .unwrap()
            .register::<Crash>()
            .unwrap()
            .observer(observer)
            .expect_scenarios(&["accuracy", "crash"])
            .build(Arc::clone(&self.store), WorkerId::new(id))
            .unwrap()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fetches_hand_each_task_to_exactly_one_worker() {
    let setup = Setup::new();
    let producer = setup.producer();
    for i in 0..8 {
        producer
            .enqueue(NewTask::new(format!("t{i}"), "good.json"))
            .await
            .unwrap();
    }

    let mut joins = Vec::new();
    for w in 0..20 {
        let queue = TaskQueue::new(
            Arc::clone(&setup.store),
            setup.dir.path(),
            WorkerId::new(format!("w{w}")),
        );
        joins.push(tokio::spawn(async move { queue.fetch_one().await.unwrap() }));
    }

    let mut ids = HashSet::new();
    let mut nones = 0;
    for j in joins {
        match j.await.unwrap() {
            Some(task) => assert!(ids.insert(task.id().clone())),
            None => nones += 1,
        }
    }
    assert_eq!(ids.len(), 8);
    assert_eq!(nones, 12);
}

#[tokio::test]
async fn two_workers_split_two_tasks() {
    let setup = Setup::new();
    let producer = setup.producer();
    let a = producer
        .enqueue(NewTask::new("A", "good.json").with_param("lr", json!(0.1)))
        .await
        .unwrap();
    let b = producer
        .enqueue(NewTask::new("B", "good.json").with_param("lr", json!(0.2)))
        .await
        .unwrap();

    let observer = Arc::new(Recorder::default());
    let w1 = setup.worker("w1", observer.clone());
    let w2 = setup.worker("w2", observer.clone());

    let (first, second) = tokio::join!(w1.run_once(), w2.run_once());
    let mut done = HashSet::new();
    for it in [first, second] {
        match it {
            Iteration::Processed(p) => {
                assert_eq!(p.status, RunStatus::Completed);
                assert!(p.removed);
                done.insert(p.task_id);
            }
            other => panic!("expected a processed task, got {other:?}"),
        }
    }
    assert_eq!(done, HashSet::from([a, b]));
    assert!(matches!(w1.run_once().await, Iteration::Empty));
    assert_eq!(producer.counts().await.unwrap(), QueueCounts::default());
}

#[tokio::test]
async fn failing_task_is_reported_and_removed() {
    let setup = Setup::new();
    let producer = setup.producer();
    let c = producer
        .enqueue(NewTask::new("C", "good.json").with_param("lr", json!(5.0)))
        .await
        .unwrap();

    let observer = Arc::new(Recorder::default());
    let worker = setup.worker("w1", observer.clone());
    worker.run_once().await;

    let finished = observer.finished.lock().unwrap().clone();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].task_id, c);
    assert_eq!(finished[0].status, RunStatus::Failed);
    let failure = finished[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::ScenarioFailed);
    assert!(failure.message.contains("training diverged"));
    assert!(!producer.contains(&c).await.unwrap());
}

#[tokio::test]
async fn cleanup_happens_even_with_panics_and_a_broken_observer() {
    let setup = Setup::new();
    let producer = setup.producer();
    producer.enqueue(NewTask::new("crash", "crash.yaml")).await.unwrap();
    producer
        .enqueue(NewTask::new("ok", "good.json").with_param("lr", json!(0.3)))
        .await
        .unwrap();

    let observer = Arc::new(Recorder {
        fail_all: true,
        ..Recorder::default()
    });
    let worker = setup.worker("w1", observer.clone());
    let (_tx, rx) = watch::channel(false);
    let stats = WorkerBuilder::new(
        WorkerConfig::new(setup.dir.path()).with_exit_when_empty(true),
    )
    .register::<Accuracy>()
    .unwrap()
    .register::<Crash>()
    .unwrap()
    .observer(observer.clone())
    .build(Arc::clone(&setup.store), WorkerId::new("w2"))
    .unwrap()
    .run(rx)
    .await;

    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.remove_failures, 0);
    let kinds: Vec<_> = observer
        .finished
        .lock()
        .unwrap()
        .iter()
        .map(|f| f.failure.as_ref().map(|d| d.kind))
        .collect();
    assert_eq!(kinds, vec![Some(FailureKind::Panicked), None]);
    assert!(matches!(worker.run_once().await, Iteration::Empty));
}

#[tokio::test(start_paused = true)]
async fn empty_polls_wait_for_sleep_time() {
    let setup = Setup::new();
    let worker = Arc::new(setup.worker("w1", Arc::new(Recorder::default())));

    let (tx, rx) = watch::channel(false);
    let started = tokio::time::Instant::now();
    let handle = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run(rx).await }
    });

    // a task that shows up during the sleep is only seen at the next poll
    tokio::time::sleep(Duration::from_secs(10)).await;
    setup
        .producer()
        .enqueue(NewTask::new("late", "good.json").with_param("lr", json!(0.5)))
        .await
        .unwrap();
    assert_eq!(setup.producer().counts().await.unwrap().unclaimed, 1);

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(setup.producer().counts().await.unwrap().total(), 0);

    tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    assert_eq!(stats.completed, 1);
    assert!(stats.empty_polls >= 1);
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test]
async fn crashed_worker_claim_is_visible_and_reclaimable() {
    let setup = Setup::new();
    let producer = setup.producer();
    let id = producer.enqueue(NewTask::new("lost", "good.json")).await.unwrap();

    {
        let doomed = TaskQueue::new(
            Arc::clone(&setup.store),
            setup.dir.path(),
            WorkerId::new("doomed"),
        );
        let task = doomed.fetch_one().await.unwrap().unwrap();
        assert_eq!(task.id(), &id);
        // dropped without remove
    }

    assert!(producer.contains(&id).await.unwrap());
    let claimed = producer.claimed().await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].worker.as_str(), "doomed");
    assert!(producer.fetch_one().await.unwrap().is_none());

    let released = producer.reclaim_stale(Duration::ZERO).await.unwrap();
    assert_eq!(released, vec![id.clone()]);
    let again = producer.fetch_one().await.unwrap().unwrap();
    assert_eq!(again.id(), &id);
}
