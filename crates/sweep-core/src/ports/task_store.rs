//! TaskStore port - the shared store every worker coordinates through.
//!
//! Backends are dumb document stores. Decoding documents into `Task`s,
//! resolving description paths and deciding what to do with malformed
//! documents all live in `TaskQueue`.
//!
//! # Contract
//! - `claim_one` is the only place a document changes from unclaimed to
//!   claimed, and it must do select-and-mark as one indivisible store
//!   operation. Two callers racing on the same store never get the same
//!   document.
//! - `delete` reports whether something was deleted; deleting an absent id is
//!   not an error.
//! - Connectivity problems are `QueueError::StoreUnavailable`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Claim, ClaimState, Params, QueueCounts, QueueError, TaskId};

/// A task document as persisted: identity, producer-written body
/// (`name`, `params`, `description_file`, anything else) and the claim marker.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDocument {
    pub id: TaskId,
    pub body: Params,
    pub claim: Option<Claim>,
}

impl TaskDocument {
    pub fn unclaimed(id: TaskId, body: Params) -> Self {
        Self {
            id,
            body,
            claim: None,
        }
    }

    pub fn state(&self) -> ClaimState {
        if self.claim.is_some() {
            ClaimState::Claimed
        } else {
            ClaimState::Unclaimed
        }
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new unclaimed document. Fails with `DuplicateTask` if the id exists.
    async fn insert(&self, doc: TaskDocument) -> Result<(), QueueError>;

    /// Atomically pick one unclaimed document (oldest first where the backend
    /// can tell), stamp `claim` on it and return it.
    async fn claim_one(&self, claim: Claim) -> Result<Option<TaskDocument>, QueueError>;

    async fn delete(&self, id: &TaskId) -> Result<bool, QueueError>;

    async fn get(&self, id: &TaskId) -> Result<Option<TaskDocument>, QueueError>;

    /// Clear claims stamped at or before `cutoff`. Returns the released ids.
    async fn release_claimed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, QueueError>;

    async fn list_claimed(&self) -> Result<Vec<TaskDocument>, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;
}
