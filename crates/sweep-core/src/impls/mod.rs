//! Implementations of the ports.
//!
//! - **InMemoryTaskStore**: always available; tests and single-process runs
//! - **TracingObserver** / **ObserverSet**: log sink and fan-out
//! - **MongoTaskStore** / **MongoObserver**: feature `mongodb`

pub mod memory;
pub mod observers;

#[cfg(feature = "mongodb")]
pub mod mongo;
#[cfg(feature = "mongodb")]
pub mod mongo_observer;

pub use self::memory::InMemoryTaskStore;
pub use self::observers::{ObserverSet, TracingObserver};

#[cfg(feature = "mongodb")]
pub use self::mongo::MongoTaskStore;
#[cfg(feature = "mongodb")]
pub use self::mongo_observer::MongoObserver;
