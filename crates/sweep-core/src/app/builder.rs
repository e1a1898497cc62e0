//! WorkerBuilder - wires registry, observer and config into a `WorkerLoop`.
//!
//! Startup checks fail fast: scenarios the deployment expects must be
//! registered, and the config must make sense, before any task is claimed.

use std::sync::Arc;

use crate::domain::{Params, ScenarioError, WorkerId};
use crate::impls::TracingObserver;
use crate::ports::{Clock, RunObserver, SystemClock, TaskStore};
use crate::queue::TaskQueue;
use crate::typed::{NamedScenario, RegistryError, Scenario, ScenarioRegistry};

use super::config::WorkerConfig;
use super::runtime::Runtime;
use super::worker_loop::WorkerLoop;

/// ```ignore
/// let worker = WorkerBuilder::new(WorkerConfig::new("/srv/tasks"))
///     .register::<ImdbAttention>()?
///     .expect_scenarios(&["imdb_attention"])
///     .build(store, WorkerId::generate())?;
/// ```
pub struct WorkerBuilder {
    registry: ScenarioRegistry,
    observer: Option<Arc<dyn RunObserver>>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    expected: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing scenarios: {0:?}. These were expected but not registered.")]
    MissingScenarios(Vec<String>),

    #[error("invalid worker config: {0}")]
    InvalidConfig(String),
}

impl WorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            registry: ScenarioRegistry::new(),
            observer: None,
            clock: Arc::new(SystemClock),
            config,
            expected: None,
        }
    }

    pub fn register<S: NamedScenario>(mut self) -> Result<Self, RegistryError> {
        self.registry.register::<S>()?;
        Ok(self)
    }

    pub fn register_fn<F>(mut self, name: impl Into<String>, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(Params) -> Result<Box<dyn Scenario>, ScenarioError> + Send + Sync + 'static,
    {
        self.registry.register_fn(name, f)?;
        Ok(self)
    }

    /// Replace the registry wholesale (scenarios registered so far are dropped).
    pub fn registry(mut self, registry: ScenarioRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Defaults to `TracingObserver`.
    pub fn observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn expect_scenarios(mut self, names: &[&str]) -> Self {
        self.expected = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn build(
        self,
        store: Arc<dyn TaskStore>,
        worker: WorkerId,
    ) -> Result<WorkerLoop, BuildError> {
        self.config.validate().map_err(BuildError::InvalidConfig)?;

        if let Some(expected) = &self.expected {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.registry.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingScenarios(missing));
            }
        }

        let queue = TaskQueue::new(store, self.config.tasks_dir.clone(), worker)
            .with_clock(self.clock);
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver::new()));

        Ok(WorkerLoop::new(
            Arc::new(queue),
            Arc::new(Runtime::new(Arc::new(self.registry))),
            observer,
            self.config,
        ))
    }
}
