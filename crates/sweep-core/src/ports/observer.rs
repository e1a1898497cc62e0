//! RunObserver port - where run outcomes go (experiment tracker, logs, ...).
//!
//! The worker calls `started` before a scenario runs and `finished` once the
//! outcome is known. What the observer does with it is its own business; an
//! error here is logged by the worker and changes nothing else.

use async_trait::async_trait;

use crate::domain::{ObserverError, RunFinished, RunStarted};

#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn started(&self, run: &RunStarted) -> Result<(), ObserverError>;

    async fn finished(&self, run: &RunFinished) -> Result<(), ObserverError>;
}
