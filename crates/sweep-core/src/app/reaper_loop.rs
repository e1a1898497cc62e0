//! ReaperLoop - hands claims of dead workers back to the queue.
//!
//! A claim is not refreshed while its scenario runs, so `lease` has to be
//! longer than the longest run, otherwise a live task gets handed out twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::domain::{QueueError, TaskId};
use crate::queue::TaskQueue;

use super::shutdown::{sleep_or_stop, stop_requested};

pub struct ReaperLoop {
    queue: Arc<TaskQueue>,
    lease: Duration,
    interval: Duration,
}

impl ReaperLoop {
    /// Checks every `lease / 2` (at least once a second) by default.
    pub fn new(queue: Arc<TaskQueue>, lease: Duration) -> Self {
        Self {
            queue,
            lease,
            interval: (lease / 2).max(Duration::from_secs(1)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn reap_once(&self) -> Result<Vec<TaskId>, QueueError> {
        let released = self.queue.reclaim_stale(self.lease).await?;
        if !released.is_empty() {
            warn!(
                count = released.len(),
                lease_secs = self.lease.as_secs(),
                task_ids = ?released,
                "released claims older than the lease"
            );
        }
        Ok(released)
    }

    /// Reap until stopped. Returns how many claims were released in total.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut total = 0;
        loop {
            if stop_requested(&shutdown) {
                break;
            }
            match self.reap_once().await {
                Ok(released) => total += released.len(),
                Err(err) => warn!(error = %err, "reaper could not reach the task store"),
            }
            if !sleep_or_stop(self.interval, &mut shutdown).await {
                break;
            }
        }
        total
    }
}
