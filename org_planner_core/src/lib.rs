#![forbid(unsafe_code)]

/// Dataset format v1. Changing the stored document shape requires v2.
pub const DATASET_VERSION: u32 = 1;

pub mod arithmetic;
pub mod errors;
pub mod domain;
pub mod events;
pub mod state;
pub mod transitions;
pub mod invariants;
pub mod aggregation;
pub mod interaction;
pub mod hashing;

pub use errors::{PlannerError, PlannerResult};
