//! MongoDB task store (feature `mongodb`).
//!
//! Document layout, one per task:
//! `{ _id, name, params, description_file, claimed_by?, claimed_at? }`.
//! A document without `claimed_at` (or with `null`) is unclaimed. Claiming is
//! a single `findOneAndUpdate`, so the server serialises competing workers.
//!
//! `_id` may be an ObjectId (tasks written by other producers) or a string
//! (tasks written through `TaskQueue::enqueue`); both are carried as
//! `TaskId` strings and matched either way on the way back. Any other `_id`
//! type is carried as its canonical extended JSON and decoded for matching.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use crate::app::StoreConfig;
use crate::domain::{Claim, Params, QueueCounts, QueueError, StoreOp, TaskId, WorkerId};
use crate::ports::{TaskDocument, TaskStore};

const CLAIMED_BY: &str = "claimed_by";
const CLAIMED_AT: &str = "claimed_at";
const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoTaskStore {
    database: Database,
    tasks: Collection<Document>,
}

impl MongoTaskStore {
    /// Connect and ping, so a wrong URI fails at startup rather than on the
    /// first poll.
    pub async fn connect(config: &StoreConfig) -> Result<Self, QueueError> {
        let uri = config.normalized_uri();
        let client = Client::with_uri_str(&uri)
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Connect, e))?;
        let database = client.database(&config.db_name);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Connect, e))?;

        info!(uri = %uri, db = %config.db_name, collection = %config.collection, "connected to task store");
        Ok(Self::from_database(database, &config.collection))
    }

    pub fn from_database(database: Database, collection: &str) -> Self {
        Self {
            tasks: database.collection(collection),
            database,
        }
    }

    /// The database the task collection lives in (shared with `MongoObserver`).
    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl TaskStore for MongoTaskStore {
    async fn insert(&self, doc: TaskDocument) -> Result<(), QueueError> {
        let mut raw = bson::to_document(&doc.body)
            .map_err(|e| QueueError::unavailable(StoreOp::Insert, e))?;
        raw.insert("_id", doc.id.as_str());
        if let Some(claim) = &doc.claim {
            raw.insert(CLAIMED_BY, claim.worker.as_str());
            raw.insert(CLAIMED_AT, to_bson_datetime(claim.claimed_at));
        }

        match self.tasks.insert_one(raw).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(QueueError::DuplicateTask(doc.id)),
            Err(e) => Err(QueueError::unavailable(StoreOp::Insert, e)),
        }
    }

    async fn claim_one(&self, claim: Claim) -> Result<Option<TaskDocument>, QueueError> {
        let update = doc! {
            "$set": {
                CLAIMED_BY: claim.worker.as_str(),
                CLAIMED_AT: to_bson_datetime(claim.claimed_at),
            }
        };
        let claimed = self
            .tasks
            .find_one_and_update(doc! { CLAIMED_AT: Bson::Null }, update)
            .sort(doc! { "_id": 1 })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Claim, e))?;

        match claimed {
            Some(raw) => {
                let doc = from_raw(raw)?;
                debug!(task_id = %doc.id, "claimed task document");
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, QueueError> {
        let result = self
            .tasks
            .delete_one(id_filter(id))
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Delete, e))?;
        Ok(result.deleted_count > 0)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskDocument>, QueueError> {
        let found = self
            .tasks
            .find_one(id_filter(id))
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Get, e))?;
        found.map(from_raw).transpose()
    }

    async fn release_claimed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, QueueError> {
        let stale = doc! { CLAIMED_AT: { "$lte": to_bson_datetime(cutoff) } };
        let raw_ids: Vec<Bson> = self
            .tasks
            .find(stale.clone())
            .projection(doc! { "_id": 1 })
            .sort(doc! { "_id": 1 })
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Release, e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Release, e))?
            .into_iter()
            .filter_map(|mut d| d.remove("_id"))
            .collect();

        // the cutoff is repeated per document so a task removed or claimed
        // again in between is neither touched nor reported
        let mut released = Vec::with_capacity(raw_ids.len());
        for raw_id in raw_ids {
            let mut filter = stale.clone();
            filter.insert("_id", raw_id.clone());
            let result = self
                .tasks
                .update_one(filter, doc! { "$unset": { CLAIMED_BY: "", CLAIMED_AT: "" } })
                .await
                .map_err(|e| QueueError::unavailable(StoreOp::Release, e))?;
            if result.modified_count > 0 {
                released.push(id_from_bson(raw_id));
            }
        }
        Ok(released)
    }

    async fn list_claimed(&self) -> Result<Vec<TaskDocument>, QueueError> {
        let raw: Vec<Document> = self
            .tasks
            .find(doc! { CLAIMED_AT: { "$ne": Bson::Null } })
            .sort(doc! { CLAIMED_AT: 1 })
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::List, e))?
            .try_collect()
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::List, e))?;
        raw.into_iter().map(from_raw).collect()
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let unclaimed = self
            .tasks
            .count_documents(doc! { CLAIMED_AT: Bson::Null })
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Count, e))?;
        let claimed = self
            .tasks
            .count_documents(doc! { CLAIMED_AT: { "$ne": Bson::Null } })
            .await
            .map_err(|e| QueueError::unavailable(StoreOp::Count, e))?;
        Ok(QueueCounts { unclaimed, claimed })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

pub(crate) fn to_bson_datetime(at: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(at.timestamp_millis())
}

fn from_bson_datetime(at: bson::DateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis()).unwrap_or_default()
}

fn id_from_bson(id: Bson) -> TaskId {
    match id {
        Bson::ObjectId(oid) => TaskId::new(oid.to_hex()),
        Bson::String(s) => TaskId::new(s),
        other => TaskId::new(other.into_canonical_extjson().to_string()),
    }
}

/// Matches `_id` stored as the plain string, as an ObjectId when the id is
/// 24 hex digits, or as the value whose canonical extended JSON the id is.
fn id_filter(id: &TaskId) -> Document {
    let mut candidates = vec![Bson::String(id.as_str().to_string())];
    if let Ok(oid) = ObjectId::parse_str(id.as_str()) {
        candidates.push(Bson::ObjectId(oid));
    } else if id.as_str().starts_with('{') {
        let decoded = serde_json::from_str::<serde_json::Value>(id.as_str())
            .ok()
            .and_then(|json| Bson::try_from(json).ok());
        candidates.extend(decoded);
    }

    match candidates.len() {
        1 => doc! { "_id": id.as_str() },
        _ => doc! { "_id": { "$in": candidates } },
    }
}

fn from_raw(mut raw: Document) -> Result<TaskDocument, QueueError> {
    let id = match raw.remove("_id") {
        Some(id) => id_from_bson(id),
        None => {
            return Err(QueueError::MalformedTask {
                id: TaskId::new("<missing>"),
                reason: "document has no _id".to_string(),
            })
        }
    };

    let claimed_by = raw.remove(CLAIMED_BY);
    let claim = match raw.remove(CLAIMED_AT) {
        Some(Bson::DateTime(at)) => {
            let worker = match claimed_by {
                Some(Bson::String(w)) => WorkerId::new(w),
                _ => WorkerId::new("unknown"),
            };
            Some(Claim::new(worker, from_bson_datetime(at)))
        }
        _ => None,
    };

    let body = match Bson::Document(raw).into_relaxed_extjson() {
        serde_json::Value::Object(map) => map,
        _ => Params::new(),
    };
    Ok(TaskDocument { id, body, claim })
}
