//! Error categories.
//!
//! Two families are kept apart on purpose:
//! - `QueueError`: the store itself misbehaves. The worker loop backs off and
//!   retries; the task (if any) is untouched.
//! - `TaskFailure`: one task could not be executed. It is reported as a failed
//!   run and the task is still removed.
//!
//! `ObserverError` never changes what happens to a task.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::outcome::{FailureDetail, FailureKind};
use super::TaskId;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Store operation that failed, for log lines and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Connect,
    Insert,
    Claim,
    Delete,
    Get,
    Release,
    List,
    Count,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreOp::Connect => "connect",
            StoreOp::Insert => "insert",
            StoreOp::Claim => "claim",
            StoreOp::Delete => "delete",
            StoreOp::Get => "get",
            StoreOp::Release => "release",
            StoreOp::List => "list",
            StoreOp::Count => "count",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task store unavailable during {operation}: {message}")]
    StoreUnavailable {
        operation: StoreOp,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("task {id} is malformed: {reason}")]
    MalformedTask { id: TaskId, reason: String },

    #[error("task {0} already exists")]
    DuplicateTask(TaskId),
}

impl QueueError {
    pub fn unavailable<E>(operation: StoreOp, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StoreUnavailable {
            operation,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn unavailable_msg(operation: StoreOp, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation,
            message: message.into(),
            source: None,
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, QueueError::StoreUnavailable { .. })
    }
}

/// Error raised by a scenario (or its factory).
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("invalid scenario params: {0}")]
    InvalidParams(String),

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
        trace: Option<String>,
    },
}

impl ScenarioError {
    /// Failure with a message. Captures a backtrace when `RUST_BACKTRACE` is set.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
            trace: capture_trace(),
        }
    }

    /// Wraps a lower level error, keeping it as the source.
    pub fn from_source<E>(message: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(err)),
            trace: capture_trace(),
        }
    }

    pub fn trace(&self) -> Option<&str> {
        match self {
            ScenarioError::Failed { trace, .. } => trace.as_deref(),
            ScenarioError::InvalidParams(_) => None,
        }
    }
}

fn capture_trace() -> Option<String> {
    let bt = Backtrace::capture();
    match bt.status() {
        BacktraceStatus::Captured => Some(bt.to_string()),
        _ => None,
    }
}

/// A task-level failure: reported, logged, task removed, never retried.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("cannot read description file {path}: {reason}")]
    DescriptionUnreadable { path: PathBuf, reason: String },

    #[error("invalid run config: {0}")]
    InvalidConfig(String),

    #[error("no scenario registered under {0:?}")]
    UnknownScenario(String),

    #[error("scenario {scenario} failed: {source}")]
    Scenario {
        scenario: String,
        #[source]
        source: ScenarioError,
    },

    #[error("scenario {scenario} panicked: {message}")]
    Panicked { scenario: String, message: String },
}

impl TaskFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            TaskFailure::DescriptionUnreadable { .. } => FailureKind::DescriptionUnreadable,
            TaskFailure::InvalidConfig(_) => FailureKind::InvalidConfig,
            TaskFailure::UnknownScenario(_) => FailureKind::UnknownScenario,
            TaskFailure::Scenario { .. } => FailureKind::ScenarioFailed,
            TaskFailure::Panicked { .. } => FailureKind::Panicked,
        }
    }

    /// Flattens the failure (message, source chain, trace) for reporting.
    pub fn detail(&self) -> FailureDetail {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        let trace = match self {
            TaskFailure::Scenario { source, .. } => source.trace().map(str::to_string),
            _ => None,
        };
        FailureDetail {
            kind: self.kind(),
            message: self.to_string(),
            chain,
            trace,
        }
    }
}

#[derive(Debug, Error)]
#[error("observer {observer} failed: {message}")]
pub struct ObserverError {
    pub observer: String,
    pub message: String,
}

impl ObserverError {
    pub fn new(observer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            message: message.into(),
        }
    }
}
