//! sweep-core
//!
//! Experiment task queue coordinated through a shared document store.
//!
//! # Modules
//! - **domain**: tasks, claims, ids, run outcomes, errors
//! - **ports**: `TaskStore`, `RunObserver`, `Clock`, `IdGenerator`
//! - **queue**: `TaskQueue`, the claim / fetch / remove protocol
//! - **typed**: `Scenario`, `NamedScenario`, `ScenarioRegistry`
//! - **app**: `WorkerBuilder`, `WorkerLoop`, `ReaperLoop`, `Runtime`, config
//! - **impls**: in-memory and MongoDB stores, observers

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod typed;

#[cfg(test)]
mod testing;
