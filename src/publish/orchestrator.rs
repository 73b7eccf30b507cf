//! Batched publish orchestration
//!
//! # State machine
//!
//! `Detect → Expand → Schedule → Publish(batch 0..n) → Done`, with early
//! exits to Done when nothing changed or nothing is publish-eligible.
//!
//! # Correctness under partial failure
//!
//! Registry publishes are not revocable, so there is no rollback; the one
//! lever is to stop issuing publishes once a failure is observed. Batches
//! run strictly in order; packages within a batch publish concurrently.
//! The run-scoped publish-record map is the single source of truth for
//! "what version should a dependent reference now" - it is merged only at
//! batch boundaries, before the next batch's reads, so concurrent siblings
//! never observe each other (the scheduler guarantees they never need to).
//!
//! Internal dependency versions resolve by priority: a publish record from
//! a prior batch in this run, else the registry version pre-fetched at load
//! time for every target outside the publish set. Neither source yielding a
//! version is an `UnresolvedDependency` failure for the package's batch.

use crate::core::error::{FlotillaError, FlotillaResult};
use crate::detect::{Change, ChangeDetector, ChangeReason};
use crate::graph::{BatchPlan, PackageGraph, expand, schedule};
use crate::manifest::{AccessLevel, Package, Specifier};
use crate::publish::version::{BranchContext, BumpLevel, calc_update_version};
use crate::registry::RegistryGateway;
use crate::ui::MultiProgress;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use semver::Version;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PublishOptions {
  pub bump: BumpLevel,
  pub tag: String,
  pub access: AccessLevel,
  /// Skip change detection, publish every candidate
  pub force: bool,
  /// Compute the full plan and versions without writing or publishing
  pub dry_run: bool,
  /// Ceiling on the change-detection phase
  pub detect_timeout: Duration,
  /// Restrict publishing to one package (its dependents stay untouched)
  pub only: Option<String>,
  /// Suppress progress bars (e.g. for JSON output)
  pub quiet: bool,
}

/// One completed publish within the current run
#[derive(Debug, Clone)]
pub struct PublishRecord {
  pub name: String,
  pub version: Version,
  pub time: DateTime<Utc>,
}

/// The package that stopped the run, with whatever was known about it
#[derive(Debug)]
pub struct PublishFailure {
  pub package: String,
  pub error: FlotillaError,
}

/// Everything a summary needs, success or not. Earlier successes are
/// always present even when `failure` is set.
#[derive(Debug, Default)]
pub struct PublishOutcome {
  pub published: Vec<PublishRecord>,
  pub unchanged: Vec<String>,
  pub changed: Vec<(String, ChangeReason)>,
  pub plan: Option<BatchPlan>,
  pub failure: Option<PublishFailure>,
}

impl PublishOutcome {
  #[allow(dead_code)]
  pub fn succeeded(&self) -> bool {
    self.failure.is_none()
  }
}

pub struct Orchestrator<'a> {
  registry: &'a dyn RegistryGateway,
  branch: BranchContext,
  options: PublishOptions,
}

impl<'a> Orchestrator<'a> {
  pub fn new(registry: &'a dyn RegistryGateway, branch: BranchContext, options: PublishOptions) -> Self {
    Self {
      registry,
      branch,
      options,
    }
  }

  /// Drive one run end to end over an already-loaded package set.
  pub fn run(&self, packages: Vec<Package>) -> FlotillaResult<PublishOutcome> {
    // Fail the branch check before any detection I/O
    if let BranchContext::Other(name) = &self.branch {
      return Err(FlotillaError::NotPublishableBranch { branch: name.clone() });
    }

    let changes = self.detect_changes(&packages);
    self.run_with_changes(packages, changes)
  }

  /// Detect phase. Forced runs classify every candidate changed without I/O.
  fn detect_changes(&self, packages: &[Package]) -> HashMap<String, Change> {
    if self.options.force {
      return packages
        .iter()
        .map(|p| (p.name.clone(), Change::Changed(ChangeReason::Forced)))
        .collect();
    }

    let internal_names: HashSet<String> = packages.iter().map(|p| p.name.clone()).collect();
    let detector = ChangeDetector::new(self.registry, internal_names);
    let deadline = Instant::now() + self.options.detect_timeout;
    detector.detect_all(packages, deadline)
  }

  /// Expand, schedule, and publish given per-package change classifications.
  pub(crate) fn run_with_changes(
    &self,
    packages: Vec<Package>,
    changes: HashMap<String, Change>,
  ) -> FlotillaResult<PublishOutcome> {
    let mut outcome = PublishOutcome::default();

    for pkg in &packages {
      match changes.get(&pkg.name) {
        Some(Change::Changed(reason)) => outcome.changed.push((pkg.name.clone(), *reason)),
        _ => outcome.unchanged.push(pkg.name.clone()),
      }
    }
    outcome.changed.sort_by(|a, b| a.0.cmp(&b.0));
    outcome.unchanged.sort();

    let changed_names: HashSet<String> = outcome.changed.iter().map(|(name, _)| name.clone()).collect();
    if changed_names.is_empty() {
      return Ok(outcome);
    }

    // Expansion runs over the graph of ALL packages so indirect dependents
    // are found even when the middle of a chain did not itself change.
    let graph = PackageGraph::build(&packages);
    let affected = expand(&graph, &changed_names);

    let publish_set: HashSet<String> = packages
      .iter()
      .filter(|p| p.publish_eligible && affected.contains(&p.name))
      .filter(|p| {
        self
          .options
          .only
          .as_ref()
          .is_none_or(|only| &p.name == only)
      })
      .map(|p| p.name.clone())
      .collect();

    if publish_set.is_empty() {
      return Ok(outcome);
    }

    let plan = schedule(&graph, &publish_set)?;

    // Pre-fetched resolution source for internal targets outside the
    // publish set: their registry versions were fetched once at load time.
    let mut resolved: HashMap<String, Version> = packages
      .iter()
      .filter(|p| !publish_set.contains(&p.name))
      .map(|p| (p.name.clone(), p.current_version.clone()))
      .collect();

    let mut pkg_map: HashMap<String, Package> = packages.into_iter().map(|p| (p.name.clone(), p)).collect();

    let progress = (!self.options.quiet && !plan.is_empty()).then(MultiProgress::new);

    for (batch_idx, batch) in plan.batches.iter().enumerate() {
      let mut batch_pkgs: Vec<Package> = Vec::with_capacity(batch.len());
      for name in batch {
        let pkg = pkg_map
          .remove(name)
          .ok_or_else(|| FlotillaError::message(format!("package '{}' missing from run state", name)))?;
        batch_pkgs.push(pkg);
      }

      let bar = progress
        .as_ref()
        .map(|p| p.add_bar(batch.len(), format!("batch {}/{}", batch_idx + 1, plan.batches.len())));

      let results: Vec<(String, FlotillaResult<PublishRecord>)> = batch_pkgs
        .par_iter_mut()
        .map(|pkg| {
          let result = self.publish_package(pkg, &resolved);
          if let (Some(p), Some(bar)) = (&progress, &bar) {
            p.inc(bar);
          }
          (pkg.name.clone(), result)
        })
        .collect();

      // Merge at the batch boundary, never mid-batch
      let mut batch_failure: Option<PublishFailure> = None;
      for (name, result) in results {
        match result {
          Ok(record) => {
            resolved.insert(record.name.clone(), record.version.clone());
            outcome.published.push(record);
          }
          Err(error) => {
            if batch_failure.is_none() {
              batch_failure = Some(PublishFailure { package: name, error });
            }
          }
        }
      }

      if batch_failure.is_some() {
        // Earlier publishes stand; stop issuing new ones
        outcome.failure = batch_failure;
        break;
      }
    }

    outcome.plan = Some(plan);
    Ok(outcome)
  }

  /// Version one package, rewrite its internal specifiers, persist, publish.
  fn publish_package(&self, pkg: &mut Package, resolved: &HashMap<String, Version>) -> FlotillaResult<PublishRecord> {
    let next_version = calc_update_version(&pkg.current_version, self.options.bump, &self.branch)?;
    pkg.set_version(&next_version);

    let rewrites: Vec<_> = pkg
      .internal_dependencies()
      .map(|dep| {
        let target = resolved
          .get(&dep.name)
          .ok_or_else(|| FlotillaError::UnresolvedDependency {
            package: pkg.name.clone(),
            dependency: dep.name.clone(),
          })?;
        Ok((dep.category, dep.name.clone(), rewrite_specifier(&dep.specifier, target)))
      })
      .collect::<FlotillaResult<_>>()?;

    for (category, name, spec) in rewrites {
      pkg.set_dependency_specifier(category, &name, &spec);
    }

    if !self.options.dry_run {
      pkg.write_manifest()?;
      self
        .registry
        .publish(&pkg.path, &self.options.tag, self.options.access)
        .map_err(|err| FlotillaError::PublishFailed {
          package: pkg.name.clone(),
          version: next_version.to_string(),
          reason: err.to_string(),
        })?;
    }

    Ok(PublishRecord {
      name: pkg.name.clone(),
      version: next_version,
      time: Utc::now(),
    })
  }
}

/// Resolved specifier text for an internal dependency.
///
/// Workspace markers follow registry-replacement convention: `workspace:*`
/// pins the exact version, `workspace:~` keeps tilde width, everything else
/// (including plain ranges naming an in-repo package) becomes caret.
fn rewrite_specifier(spec: &Specifier, version: &Version) -> String {
  match spec {
    Specifier::Workspace(inner) => match inner.as_str() {
      "*" => version.to_string(),
      "~" => format!("~{}", version),
      _ => format!("^{}", version),
    },
    _ => format!("^{}", version),
  }
}
