//! Internal dependency graph analysis
//!
//! Built on petgraph for direct control and minimal abstraction:
//! - **package_graph**: forward ("depends on") and reverse ("depended on
//!   by") views over a package set, internal edges only
//! - **dependents**: transitive closure of "who is affected by this change"
//! - **batches**: cycle detection and level-order publish batching

pub mod batches;
pub mod dependents;
pub mod package_graph;

pub use batches::{BatchPlan, schedule};
pub use dependents::expand;
pub use package_graph::PackageGraph;

#[cfg(test)]
pub(crate) use package_graph::test_support;
