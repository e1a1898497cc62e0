//! Command line.
//!
//! `sweep <TASKS_DIR> <DB_NAME>` runs a worker; the subcommands are the
//! producer and operator side.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use sweep_core::app::StoreConfig;

#[derive(Debug, Parser)]
#[command(name = "sweep")]
#[command(about = "Run experiment tasks from a shared MongoDB queue", long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Cli {
    #[command(flatten)]
    pub worker: WorkerArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Directory description files are resolved against
    #[arg(required = true)]
    pub tasks_dir: Option<PathBuf>,

    /// Database holding the task collection
    #[arg(required = true)]
    pub db_name: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Seconds to sleep after finding the queue empty
    #[arg(long, default_value_t = 30)]
    pub sleep_time: u64,

    /// Id recorded on claims (default: generated)
    #[arg(long, env = "SWEEP_WORKER_ID")]
    pub worker_id: Option<String>,

    /// Also release claims older than this many seconds. Must exceed the
    /// longest run, claims are not refreshed while a scenario runs.
    #[arg(long, value_name = "SECS")]
    pub reclaim_after: Option<u64>,

    /// Exit when the queue is empty instead of sleeping
    #[arg(long)]
    pub exit_when_empty: bool,

    /// Attempts for removing a finished task
    #[arg(long, default_value_t = 3)]
    pub remove_attempts: u32,
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// MongoDB URI; a bare host:port gets the mongodb:// scheme
    #[arg(long, env = "SWEEP_MONGO_URI", default_value = StoreConfig::DEFAULT_URI)]
    pub mongo_uri: String,

    /// Task collection
    #[arg(long, default_value = StoreConfig::DEFAULT_COLLECTION)]
    pub collection: String,
}

impl StoreArgs {
    pub fn config(&self, db_name: &str) -> StoreConfig {
        StoreConfig::new(self.mongo_uri.clone(), db_name).with_collection(self.collection.clone())
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add one task per description file
    Enqueue {
        /// Directory the description files live in
        tasks_dir: PathBuf,
        db_name: String,
        /// Description files (default: every .json/.yaml/.yml in TASKS_DIR)
        files: Vec<PathBuf>,
        /// Extra task param, VALUE parsed as JSON when possible
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        set: Vec<(String, serde_json::Value)>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show unclaimed and claimed counts
    Status {
        db_name: String,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// List claimed tasks with their worker and claim time
    Claimed {
        db_name: String,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Release claims older than the given age back to the queue
    Reclaim {
        db_name: String,
        #[arg(long, value_name = "SECS")]
        older_than: u64,
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
