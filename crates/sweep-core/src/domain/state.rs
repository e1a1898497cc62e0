//! Claim state of a task document.

use serde::{Deserialize, Serialize};

/// Where a document sits in the queue.
///
/// Transitions:
/// - Unclaimed -> Claimed (`fetch_one`)
/// - Claimed -> Unclaimed (`reclaim_stale`, crash recovery only)
/// - either -> gone (`remove`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Unclaimed,
    Claimed,
}

impl ClaimState {
    /// Is this document eligible for `fetch_one`?
    pub fn is_claimable(self) -> bool {
        matches!(self, ClaimState::Unclaimed)
    }
}

/// Document counts by claim state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub unclaimed: u64,
    pub claimed: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.unclaimed + self.claimed
    }
}
