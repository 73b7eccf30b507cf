//! Level-order publish batching (Kahn's algorithm) with cycle detection
//!
//! Operates only on internal edges restricted to the given subset: an edge
//! to a package outside the subset does not block publishing (that target
//! resolves via the registry). Packages in a batch have no unpublished
//! internal dependency left, so everything in one batch can publish
//! concurrently.
//!
//! A cycle makes a correct batch order impossible, so scheduling fails
//! before any publish is attempted; there is never a partial plan.

use crate::core::error::{FlotillaError, FlotillaResult};
use crate::graph::PackageGraph;
use std::collections::{HashMap, HashSet};

/// Ordered, disjoint publish groups.
///
/// Invariant: a package appears in batch `i` only if every in-subset
/// internal dependency of it appears in some batch `< i`, and the union of
/// all batches is the subset exactly once each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
  pub batches: Vec<Vec<String>>,
}

impl BatchPlan {
  pub fn is_empty(&self) -> bool {
    self.batches.is_empty()
  }

  #[allow(dead_code)]
  pub fn package_count(&self) -> usize {
    self.batches.iter().map(Vec::len).sum()
  }

  /// Batch index per package, for order assertions and display
  #[allow(dead_code)]
  pub fn batch_index(&self, name: &str) -> Option<usize> {
    self
      .batches
      .iter()
      .position(|batch| batch.iter().any(|p| p == name))
  }
}

/// Compute the batch plan for `subset`.
pub fn schedule(graph: &PackageGraph, subset: &HashSet<String>) -> FlotillaResult<BatchPlan> {
  // Unpublished in-subset dependencies per package
  let mut pending_deps: HashMap<&str, usize> = subset
    .iter()
    .map(|name| {
      let blocking = graph
        .depends_on(name)
        .iter()
        .filter(|dep| subset.contains(*dep))
        .count();
      (name.as_str(), blocking)
    })
    .collect();

  let mut batches: Vec<Vec<String>> = Vec::new();
  let mut remaining = subset.len();

  while remaining > 0 {
    let mut batch: Vec<String> = pending_deps
      .iter()
      .filter(|&(_, &count)| count == 0)
      .map(|(&name, _)| name.to_string())
      .collect();

    if batch.is_empty() {
      // Everything left waits on something else left: a cycle
      let mut stuck: Vec<String> = pending_deps.keys().map(|s| s.to_string()).collect();
      stuck.sort();
      return Err(FlotillaError::CircularDependency { packages: stuck });
    }

    batch.sort();

    for name in &batch {
      pending_deps.remove(name.as_str());
      for dependent in graph.depended_by(name) {
        if let Some(count) = pending_deps.get_mut(dependent.as_str()) {
          *count -= 1;
        }
      }
    }

    remaining -= batch.len();
    batches.push(batch);
  }

  Ok(BatchPlan { batches })
}
