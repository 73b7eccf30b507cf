//! Publishing: version policy and batched orchestration

pub mod orchestrator;
pub mod version;

pub use orchestrator::{Orchestrator, PublishOptions, PublishOutcome, PublishRecord};
pub use version::{BranchContext, BumpLevel};
