//! CLI commands for flotilla
//!
//! This module contains all user-facing command implementations:
//!
//! - **publish**: Detect changes, expand dependents, and publish in
//!   dependency-ordered batches
//! - **affected**: Show which packages are affected by a git range
//! - **init**: Write a starter flotilla.toml
//!
//! Commands accept `&RunContext` to avoid redundant workspace loads.

pub mod affected;
pub mod init;
pub mod publish;

pub use affected::run_affected;
pub use init::run_init;
pub use publish::run_publish;
