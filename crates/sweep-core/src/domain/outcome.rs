//! Run outcome model: what a scenario returns and what observers receive.
//!
//! Nothing here knows about stores or loops; it is only the shape of results
//! that can be recorded and explained later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Params, RunId, TaskId, WorkerId};

/// Final status of a run. Serialized as COMPLETED / FAILED, the vocabulary
/// experiment trackers already use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// What a scenario produces: the headline result plus free-form run info
/// (metrics, curves, paths to checkpoints, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutput {
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub info: Params,
}

impl ScenarioOutput {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            info: Params::new(),
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.info.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DescriptionUnreadable,
    InvalidConfig,
    UnknownScenario,
    ScenarioFailed,
    Panicked,
}

/// Everything known about a failed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
    /// Messages of the error's sources, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Sent to observers before the scenario runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStarted {
    pub run_id: RunId,
    pub name: String,
    pub task_id: TaskId,
    pub worker: WorkerId,
    pub config: Params,
    pub started_at: DateTime<Utc>,
}

/// Sent to observers once the outcome is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFinished {
    pub run_id: RunId,
    pub name: String,
    pub task_id: TaskId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub info: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
}

impl RunFinished {
    pub fn completed(run: &RunStarted, output: ScenarioOutput, stopped_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run.run_id,
            name: run.name.clone(),
            task_id: run.task_id.clone(),
            status: RunStatus::Completed,
            result: Some(output.value),
            info: output.info,
            failure: None,
            started_at: run.started_at,
            stopped_at,
        }
    }

    pub fn failed(run: &RunStarted, failure: FailureDetail, stopped_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run.run_id,
            name: run.name.clone(),
            task_id: run.task_id.clone(),
            status: RunStatus::Failed,
            result: None,
            info: Params::new(),
            failure: Some(failure),
            started_at: run.started_at,
            stopped_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    fn started() -> RunStarted {
        RunStarted {
            run_id: RunId::from_ulid(Ulid::new()),
            name: "imdb-attention".into(),
            task_id: TaskId::new("t1"),
            worker: WorkerId::new("w1"),
            config: Params::new(),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn run_status_serializes_in_caps() {
        assert_eq!(serde_json::to_string(&RunStatus::Completed).unwrap(), "\"COMPLETED\"");
        assert_eq!(serde_json::to_string(&RunStatus::Failed).unwrap(), "\"FAILED\"");
    }

    #[test]
    fn completed_carries_value_and_info() {
        let run = started();
        let out = ScenarioOutput::new(json!(0.91)).with_info("epochs", json!(4));
        let fin = RunFinished::completed(&run, out, Utc::now());
        assert_eq!(fin.status, RunStatus::Completed);
        assert_eq!(fin.result, Some(json!(0.91)));
        assert_eq!(fin.info["epochs"], 4);
        assert!(fin.failure.is_none());
        assert_eq!(fin.run_id, run.run_id);
    }

    #[test]
    fn failed_has_no_result() {
        let run = started();
        let detail = FailureDetail {
            kind: FailureKind::Panicked,
            message: "boom".into(),
            chain: vec![],
            trace: None,
        };
        let fin = RunFinished::failed(&run, detail, Utc::now());
        let v = serde_json::to_value(&fin).unwrap();
        assert_eq!(v["status"], "FAILED");
        assert!(v.get("result").is_none());
        assert_eq!(v["failure"]["kind"], "panicked");
    }
}
