//! `flotilla publish` - detect, plan, and publish in dependency order
//!
//! The command layer resolves everything user-facing (route, branch names,
//! access, timeouts) into a `PublishOptions`, loads the package set for the
//! chosen route, and hands off to the orchestrator. All policy lives there;
//! this file is wiring and reporting.

use crate::core::context::RunContext;
use crate::core::error::{FlotillaError, FlotillaResult, ResultExt};
use crate::manifest::{AccessLevel, Package, discover_package_dirs, load_packages};
use crate::publish::{BranchContext, BumpLevel, Orchestrator, PublishOptions};
use rayon::prelude::*;
use serde_json::json;
use std::process::Command;
use std::time::Duration;

/// How much of the workspace a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
  /// The root directory is itself the one package
  Single,
  /// Load the whole workspace, publish one named package
  MonorepoSingle,
  /// Load and publish the whole workspace
  Workspace,
}

impl Route {
  fn from_str(s: &str) -> FlotillaResult<Self> {
    match s.to_lowercase().as_str() {
      "single" => Ok(Self::Single),
      "monorepo-single" => Ok(Self::MonorepoSingle),
      "workspace" => Ok(Self::Workspace),
      _ => Err(FlotillaError::message(format!(
        "Unknown route '{}'. Valid routes: single, monorepo-single, workspace",
        s
      ))),
    }
  }
}

#[allow(clippy::too_many_arguments)]
pub fn run_publish(
  ctx: &RunContext,
  route: String,
  bump: String,
  tag: Option<String>,
  access: Option<String>,
  main_branch: Option<String>,
  dev_branch: Option<String>,
  package: Option<String>,
  force: bool,
  dry_run: bool,
  json: bool,
  detect_timeout: Option<u64>,
  build_command: Option<String>,
) -> FlotillaResult<()> {
  let route = Route::from_str(&route)?;

  let bump = BumpLevel::parse(&bump).ok_or_else(|| {
    FlotillaError::with_help(
      format!("Unknown bump level '{}'", bump),
      "Valid levels: major, minor, patch",
    )
  })?;

  let access_str = access.unwrap_or_else(|| ctx.config.publish.access.clone());
  let access = AccessLevel::parse(&access_str).ok_or_else(|| {
    FlotillaError::with_help(
      format!("Unknown access level '{}'", access_str),
      "Valid levels: public, restricted",
    )
  })?;

  if route == Route::MonorepoSingle && package.is_none() {
    return Err(FlotillaError::with_help(
      "Route 'monorepo-single' needs a target package",
      "Pass --package <name> to pick one",
    ));
  }

  let main_branch = main_branch.unwrap_or_else(|| ctx.config.branches.main.clone());
  let dev_branch = dev_branch.unwrap_or_else(|| ctx.config.branches.dev.clone());
  let current = ctx.vcs.current_branch()?;
  let branch = BranchContext::resolve(&current, &main_branch, &dev_branch);

  // Skips still produce a machine-readable envelope; scripted consumers
  // must never see exit 0 with an empty stdout.
  if let BranchContext::Other(name) = &branch {
    if json {
      print_json_skip(name);
    }
    return Err(FlotillaError::NotPublishableBranch { branch: name.clone() });
  }

  let dirs = match route {
    Route::Single => vec![ctx.root.clone()],
    Route::MonorepoSingle | Route::Workspace => discover_package_dirs(&ctx.root, &ctx.config)?,
  };
  let packages = load_packages(&dirs, access, ctx.registry.as_ref())?;

  let build_command = build_command.or_else(|| ctx.config.publish.build.clone());
  if let Some(command) = &build_command {
    if !json {
      println!("🔧 Running build command in {} package(s)", packages.len());
    }
    run_build_step(&packages, command)?;
  }

  let timeout_secs = detect_timeout.unwrap_or(ctx.config.publish.detect_timeout_secs);
  let options = PublishOptions {
    bump,
    tag: tag.unwrap_or_else(|| ctx.config.publish.tag.clone()),
    access,
    force,
    dry_run,
    detect_timeout: Duration::from_secs(timeout_secs),
    only: match route {
      Route::MonorepoSingle => package,
      _ => None,
    },
    quiet: json,
  };

  if !json {
    let mode = if dry_run { " (dry run)" } else { "" };
    println!("🚀 Publishing from '{}'{}", current, mode);
    println!("   {} package(s) loaded", packages.len());
  }

  let orchestrator = Orchestrator::new(ctx.registry.as_ref(), branch, options);
  let outcome = orchestrator.run(packages)?;

  if json {
    print_json(&outcome);
  } else {
    print_text(&outcome, dry_run);
  }

  // Earlier batches stand even on failure; report them first, then fail
  match outcome.failure {
    Some(failure) => Err(failure.error),
    None => Ok(()),
  }
}

fn print_text(outcome: &crate::publish::PublishOutcome, dry_run: bool) {
  if !outcome.changed.is_empty() {
    println!();
    println!("📦 Changed packages:");
    for (name, reason) in &outcome.changed {
      println!("   {} ({})", name, reason.describe());
    }
  }

  if let Some(plan) = &outcome.plan {
    println!();
    println!("🗂️  Publish plan ({} batches):", plan.batches.len());
    for (i, batch) in plan.batches.iter().enumerate() {
      println!("   {}. {}", i + 1, batch.join(", "));
    }
  }

  println!();
  if outcome.published.is_empty() {
    println!("✅ Nothing to publish");
  } else {
    let verb = if dry_run { "Would publish" } else { "Published" };
    println!("✅ {} {} package(s):", verb, outcome.published.len());
    for record in &outcome.published {
      println!("   {}@{}", record.name, record.version);
    }
  }

  if let Some(failure) = &outcome.failure {
    println!();
    println!("❌ Stopped after '{}' failed; later batches were not attempted", failure.package);
  }
}

fn print_json(outcome: &crate::publish::PublishOutcome) {
  let value = json!({
    "changed": outcome.changed.iter().map(|(name, reason)| json!({
      "name": name,
      "reason": reason.describe(),
    })).collect::<Vec<_>>(),
    "unchanged": outcome.unchanged,
    "batches": outcome.plan.as_ref().map(|p| p.batches.clone()).unwrap_or_default(),
    "published": outcome.published.iter().map(|r| json!({
      "name": r.name,
      "version": r.version.to_string(),
      "time": r.time.to_rfc3339(),
    })).collect::<Vec<_>>(),
    "failure": outcome.failure.as_ref().map(|f| json!({
      "package": f.package,
      "error": f.error.to_string(),
    })),
    "skipped": Option::<String>::None,
  });
  println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
}

/// Same envelope shape as a normal run, with the skip reason filled in
fn print_json_skip(branch: &str) {
  let value = json!({
    "changed": [],
    "unchanged": [],
    "batches": [],
    "published": [],
    "failure": Option::<String>::None,
    "skipped": {
      "reason": "branch is neither the main nor the dev branch",
      "branch": branch,
    },
  });
  println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
}

/// Run the configured build command in every loaded package directory.
///
/// Same isolation as the registry and git gateways: cleared environment
/// with only PATH and HOME passed through. Any failure aborts the run
/// before detection; publishing a stale artifact is worse than stopping.
fn run_build_step(packages: &[Package], command: &str) -> FlotillaResult<()> {
  packages.par_iter().try_for_each(|pkg| {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(&pkg.path);

    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
      cmd.env("PATH", path);
    }
    if let Ok(home) = std::env::var("HOME") {
      cmd.env("HOME", home);
    }

    let output = cmd
      .output()
      .with_context(|| format!("failed to run build command for '{}'", pkg.name))?;

    if !output.status.success() {
      return Err(FlotillaError::message(format!(
        "build command failed for '{}': {}",
        pkg.name,
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }

    Ok(())
  })
}
