//! Package dependency graph built from declared manifests + petgraph
//!
//! - **Directed graph**: `A → B` means "A depends on B"
//! - **Nodes**: every package in the active set
//! - **Edges**: internal dependencies only, and only when the target is in
//!   the same set; anything else resolves via the registry instead
//! - **Index**: fast lookups by package name
//!
//! The graph is a derived, non-owning view: rebuilt per run, never mutated
//! across runs.

use crate::manifest::{DepCategory, Package};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

pub struct PackageGraph {
  /// Nodes: package names. Edges: the manifest section declaring the dependency.
  graph: DiGraph<String, DepCategory>,

  /// Index: package name → node index
  name_to_node: HashMap<String, NodeIndex>,
}

impl PackageGraph {
  /// Build forward and reverse adjacency in one pass over the package set.
  ///
  /// All dependency categories (runtime, development, peer) contribute
  /// edges; duplicates across categories are fine for the traversals here.
  pub fn build(packages: &[Package]) -> Self {
    let mut graph = DiGraph::new();
    let mut name_to_node = HashMap::with_capacity(packages.len());

    for package in packages {
      let idx = graph.add_node(package.name.clone());
      name_to_node.insert(package.name.clone(), idx);
    }

    for package in packages {
      let from = name_to_node[&package.name];
      for dep in package.internal_dependencies() {
        // Internal deps with no in-set target resolve via the registry
        if let Some(&to) = name_to_node.get(&dep.name)
          && from != to
        {
          graph.add_edge(from, to, dep.category);
        }
      }
    }

    Self { graph, name_to_node }
  }

  pub fn contains(&self, name: &str) -> bool {
    self.name_to_node.contains_key(name)
  }

  /// Packages `name` directly depends on (forward view)
  pub fn depends_on(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Outgoing)
  }

  /// Packages that directly depend on `name` (reverse view)
  pub fn depended_by(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Incoming)
  }

  fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
    let Some(&idx) = self.name_to_node.get(name) else {
      return vec![];
    };

    let mut result: Vec<String> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    result.sort();
    result.dedup();
    result
  }
}


#[cfg(test)]
pub(crate) mod test_support {
  use crate::manifest::{AccessLevel, DepCategory, DepKind, Dependency, Package, Specifier};
  use semver::Version;
  use serde_json::{Map, Value};
  use std::path::PathBuf;

  /// Package whose listed deps are all internal runtime `workspace:*` entries
  pub fn package_with_deps(name: &str, deps: &[&str]) -> Package {
    let mut dep_map = Map::new();
    for dep in deps {
      dep_map.insert(dep.to_string(), Value::String("workspace:*".to_string()));
    }

    let mut manifest = Map::new();
    manifest.insert("name".to_string(), Value::String(name.to_string()));
    manifest.insert("version".to_string(), Value::String("0.1.0".to_string()));
    manifest.insert("dependencies".to_string(), Value::Object(dep_map));

    Package {
      name: name.to_string(),
      path: PathBuf::from(format!("/tmp/{}", name)),
      current_version: Version::new(0, 1, 0),
      registry_artifact: None,
      access: AccessLevel::Public,
      publish_eligible: true,
      dependencies: deps
        .iter()
        .map(|dep| Dependency {
          name: dep.to_string(),
          kind: DepKind::Internal,
          specifier: Specifier::Workspace("*".to_string()),
          category: DepCategory::Runtime,
        })
        .collect(),
      manifest,
    }
  }
}
