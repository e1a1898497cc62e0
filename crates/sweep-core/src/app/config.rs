//! Worker and store configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::queue::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Directory relative `description_file` entries are resolved against.
    pub tasks_dir: PathBuf,

    /// Idle pause after an empty poll.
    pub sleep_time: Duration,

    /// Backoff between retries when the store is unreachable.
    pub store_backoff: RetryPolicy,

    /// Tries for the cleanup `remove` before giving up on a task.
    pub remove_attempts: u32,

    /// Stop on the first empty poll instead of sleeping.
    pub exit_when_empty: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("."),
            sleep_time: Duration::from_secs(30),
            store_backoff: RetryPolicy::default(),
            remove_attempts: 3,
            exit_when_empty: false,
        }
    }
}

impl WorkerConfig {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_sleep_time(mut self, sleep_time: Duration) -> Self {
        self.sleep_time = sleep_time;
        self
    }

    pub fn with_store_backoff(mut self, policy: RetryPolicy) -> Self {
        self.store_backoff = policy;
        self
    }

    pub fn with_remove_attempts(mut self, attempts: u32) -> Self {
        self.remove_attempts = attempts;
        self
    }

    pub fn with_exit_when_empty(mut self, exit: bool) -> Self {
        self.exit_when_empty = exit;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.remove_attempts == 0 {
            return Err("remove_attempts must be at least 1".to_string());
        }
        if self.tasks_dir.as_os_str().is_empty() {
            return Err("tasks_dir must not be empty".to_string());
        }
        Ok(())
    }
}

/// Where the task documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub uri: String,
    pub db_name: String,
    pub collection: String,
}

impl StoreConfig {
    pub const DEFAULT_URI: &'static str = "localhost:27017";
    pub const DEFAULT_COLLECTION: &'static str = "tasks";
    pub const RUNS_COLLECTION: &'static str = "runs";

    pub fn new(uri: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            db_name: db_name.into(),
            collection: Self::DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// `host:port` style URIs get a `mongodb://` scheme.
    pub fn normalized_uri(&self) -> String {
        let uri = self.uri.trim();
        if uri.contains("://") {
            uri.to_string()
        } else {
            format!("mongodb://{uri}")
        }
    }
}
