//! IdGenerator port.
//!
//! Run ids (and task ids for tasks enqueued through `TaskQueue`) are ULIDs
//! built from the injected clock plus random bits, so ids sort by creation
//! time even when produced by many workers at once.

use ulid::Ulid;

use crate::domain::{RunId, TaskId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;

    fn generate_task_id(&self) -> TaskId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        RunId::from(self.next_ulid())
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::new(format!("task-{}", self.next_ulid()))
    }
}
