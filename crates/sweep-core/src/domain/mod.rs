//! Domain model (ids, tasks, claims, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use self::errors::{BoxError, ObserverError, QueueError, ScenarioError, StoreOp, TaskFailure};
pub use self::ids::{Id, IdMarker, RunId, TaskId, WorkerId};
pub use self::outcome::{
    FailureDetail, FailureKind, RunFinished, RunStarted, RunStatus, ScenarioOutput,
};
pub use self::state::{ClaimState, QueueCounts};
pub use self::task::{Claim, NewTask, Params, Task};
