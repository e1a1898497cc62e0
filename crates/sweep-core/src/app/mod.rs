//! Application layer: the worker and reaper loops and the pieces they are
//! wired from.
//!
//! - **WorkerBuilder**: registry + observer + config -> `WorkerLoop`
//! - **Runtime**: run config -> scenario -> `ScenarioOutput`
//! - **WorkerLoop**: fetch -> execute -> report -> remove
//! - **ReaperLoop**: releases claims of workers that died mid-task

pub mod builder;
pub mod config;
pub mod context;
pub mod reaper_loop;
pub mod runtime;
mod shutdown;
pub mod worker_loop;

pub use self::builder::{BuildError, WorkerBuilder};
pub use self::config::{StoreConfig, WorkerConfig};
pub use self::reaper_loop::ReaperLoop;
pub use self::runtime::Runtime;
pub use self::worker_loop::{Iteration, ProcessedTask, WorkerLoop, WorkerStats};
