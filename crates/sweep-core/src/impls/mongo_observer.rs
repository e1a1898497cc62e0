//! Run records in MongoDB (feature `mongodb`).
//!
//! One document per run in the `runs` collection, keyed by run id: inserted
//! with status `RUNNING` when the run starts, completed in place when it
//! finishes.

use async_trait::async_trait;
use mongodb::bson::{self, doc, Document};
use mongodb::{Collection, Database};

use crate::app::StoreConfig;
use crate::domain::{ObserverError, RunFinished, RunStarted};
use crate::ports::RunObserver;

use super::mongo::to_bson_datetime;

const NAME: &str = "mongo";

pub struct MongoObserver {
    runs: Collection<Document>,
}

impl MongoObserver {
    pub fn new(database: &Database) -> Self {
        Self::with_collection(database, StoreConfig::RUNS_COLLECTION)
    }

    pub fn with_collection(database: &Database, collection: &str) -> Self {
        Self {
            runs: database.collection(collection),
        }
    }
}

fn err(e: impl std::fmt::Display) -> ObserverError {
    ObserverError::new(NAME, e.to_string())
}

#[async_trait]
impl RunObserver for MongoObserver {
    async fn started(&self, run: &RunStarted) -> Result<(), ObserverError> {
        let record = doc! {
            "_id": run.run_id.to_string(),
            "name": run.name.as_str(),
            "task_id": run.task_id.as_str(),
            "worker": run.worker.as_str(),
            "config": bson::to_bson(&run.config).map_err(err)?,
            "status": "RUNNING",
            "start_time": to_bson_datetime(run.started_at),
        };
        self.runs.insert_one(record).await.map_err(err)?;
        Ok(())
    }

    async fn finished(&self, run: &RunFinished) -> Result<(), ObserverError> {
        let mut update = doc! {
            "status": bson::to_bson(&run.status).map_err(err)?,
            "info": bson::to_bson(&run.info).map_err(err)?,
            "stop_time": to_bson_datetime(run.stopped_at),
        };
        if let Some(result) = &run.result {
            update.insert("result", bson::to_bson(result).map_err(err)?);
        }
        if let Some(failure) = &run.failure {
            update.insert("failure", bson::to_bson(failure).map_err(err)?);
        }

        // upsert: a lost `started` still leaves a complete record
        self.runs
            .update_one(
                doc! { "_id": run.run_id.to_string() },
                doc! {
                    "$set": update,
                    "$setOnInsert": {
                        "name": run.name.as_str(),
                        "task_id": run.task_id.as_str(),
                        "start_time": to_bson_datetime(run.started_at),
                    },
                },
            )
            .upsert(true)
            .await
            .map_err(err)?;
        Ok(())
    }
}
