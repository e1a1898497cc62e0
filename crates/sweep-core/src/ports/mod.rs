//! Ports - the seams to external systems.
//!
//! - `TaskStore`: the shared document store (source of truth for queue state)
//! - `RunObserver`: the experiment tracking sink
//! - `Clock` / `IdGenerator`: time and id generation, swappable in tests

pub mod clock;
pub mod id_generator;
pub mod observer;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::observer::RunObserver;
pub use self::task_store::{TaskDocument, TaskStore};
