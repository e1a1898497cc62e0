//! In-memory task store.
//!
//! Shares state between every `TaskQueue` holding the same `Arc`, which is
//! enough for tests and for several workers inside one process. Claims are
//! atomic because select-and-mark happens under one lock.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{Claim, QueueCounts, QueueError, TaskId};
use crate::ports::{TaskDocument, TaskStore};

struct Entry {
    /// Insertion sequence; gives FIFO order and a stable slot on release.
    seq: u64,
    doc: TaskDocument,
}

#[derive(Default)]
struct InMemoryState {
    /// All documents (single source of truth).
    records: HashMap<TaskId, Entry>,

    /// Unclaimed documents by insertion order. Claimed ids are not in here.
    unclaimed: BTreeMap<u64, TaskId>,

    next_seq: u64,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.records.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, doc: TaskDocument) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&doc.id) {
            return Err(QueueError::DuplicateTask(doc.id));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        if doc.claim.is_none() {
            state.unclaimed.insert(seq, doc.id.clone());
        }
        state.records.insert(doc.id.clone(), Entry { seq, doc });
        Ok(())
    }

    async fn claim_one(&self, claim: Claim) -> Result<Option<TaskDocument>, QueueError> {
        let mut state = self.state.lock().await;
        while let Some((_, id)) = state.unclaimed.pop_first() {
            if let Some(entry) = state.records.get_mut(&id) {
                entry.doc.claim = Some(claim);
                return Ok(Some(entry.doc.clone()));
            }
        }
        Ok(None)
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, QueueError> {
        let mut state = self.state.lock().await;
        match state.records.remove(id) {
            Some(entry) => {
                state.unclaimed.remove(&entry.seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskDocument>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.records.get(id).map(|e| e.doc.clone()))
    }

    async fn release_claimed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, QueueError> {
        let mut state = self.state.lock().await;
        let mut released = Vec::new();
        for entry in state.records.values_mut() {
            let stale = entry
                .doc
                .claim
                .as_ref()
                .is_some_and(|c| c.claimed_at <= cutoff);
            if stale {
                entry.doc.claim = None;
                released.push((entry.seq, entry.doc.id.clone()));
            }
        }
        released.sort_by_key(|(seq, _)| *seq);
        for (seq, id) in &released {
            state.unclaimed.insert(*seq, id.clone());
        }
        Ok(released.into_iter().map(|(_, id)| id).collect())
    }

    async fn list_claimed(&self) -> Result<Vec<TaskDocument>, QueueError> {
        let state = self.state.lock().await;
        let mut claimed: Vec<&Entry> = state
            .records
            .values()
            .filter(|e| e.doc.claim.is_some())
            .collect();
        claimed.sort_by_key(|e| e.seq);
        Ok(claimed.into_iter().map(|e| e.doc.clone()).collect())
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        let unclaimed = state.unclaimed.len() as u64;
        Ok(QueueCounts {
            unclaimed,
            claimed: state.records.len() as u64 - unclaimed,
        })
    }
}
