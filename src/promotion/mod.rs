// src/promotion/mod.rs

//! Promotion runs: records, storage, environment and execution.

pub mod environment;
pub mod record;
pub mod runner;
pub mod store;

pub use record::{PromotionRun, RunResult, TargetRef};
pub use runner::{RunOutcome, run_next};
pub use store::RunStore;
