//! Reverse-dependency expansion: who is affected by this change
//!
//! Breadth-first closure over the reverse graph. The graph must be built
//! from ALL packages, not just the changed subset, so indirect dependents
//! are discovered even when the middle of the chain is not in the initial
//! change set. The visited set makes the traversal cycle-safe without any
//! special handling, and makes expansion idempotent.

use crate::graph::PackageGraph;
use std::collections::{HashSet, VecDeque};

/// Transitive closure of dependents, seeds included.
pub fn expand(graph: &PackageGraph, changed: &HashSet<String>) -> HashSet<String> {
  let mut result = HashSet::new();
  let mut queue: VecDeque<String> = VecDeque::new();

  for name in changed {
    if graph.contains(name) && result.insert(name.clone()) {
      queue.push_back(name.clone());
    }
  }

  while let Some(current) = queue.pop_front() {
    for dependent in graph.depended_by(&current) {
      if result.insert(dependent.clone()) {
        queue.push_back(dependent);
      }
    }
  }

  result
}
