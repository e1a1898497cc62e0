use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, WorkerId};

/// Experiment configuration mapping (`params`, description file contents,
/// and the merged run config all share this shape).
pub type Params = serde_json::Map<String, serde_json::Value>;

/// One unit of work, as handed to a worker by `TaskQueue::fetch_one`.
///
/// Immutable once fetched. `description_file` is already resolved against the
/// worker's tasks directory; the queue never opens it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    name: String,
    params: Params,
    description_file: PathBuf,
}

impl Task {
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        params: Params,
        description_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            params,
            description_file: description_file.into(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn description_file(&self) -> &Path {
        &self.description_file
    }
}

/// Producer side input: the persisted part of a task document.
///
/// `description_file` is kept exactly as written (usually relative to the
/// tasks directory shared by producers and workers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub params: Params,
    pub description_file: String,
}

impl NewTask {
    pub fn new(name: impl Into<String>, description_file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
            description_file: description_file.into(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Claim marker stored on a task document while a worker owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub worker: WorkerId,
    pub claimed_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(worker: WorkerId, claimed_at: DateTime<Utc>) -> Self {
        Self { worker, claimed_at }
    }
}
