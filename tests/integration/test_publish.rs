//! Tests for the `publish` command
//!
//! These run offline: registry lookups fail and degrade to "never
//! published", which classifies every package as changed, and --dry-run
//! keeps the run from reaching the registry at all.

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_dry_run_plans_in_dependency_order() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.add_package("utils", "1.0.0", &[("core", "workspace:*")])?;
  workspace.add_package("app", "1.0.0", &[("core", "workspace:*"), ("utils", "workspace:*")])?;
  workspace.commit("Add packages")?;

  let output = run_flotilla(&workspace.path, &["publish", "--dry-run"])?;
  let stdout = stdout_of(&output);

  // Never-published packages bump from 0.0.0
  assert!(stdout.contains("core@0.0.1"));
  assert!(stdout.contains("utils@0.0.1"));
  assert!(stdout.contains("app@0.0.1"));

  // core alone in batch 1, app last
  assert!(stdout.contains("1. core"), "missing first batch:\n{}", stdout);
  assert!(stdout.contains("2. utils"), "missing second batch:\n{}", stdout);
  assert!(stdout.contains("3. app"), "missing third batch:\n{}", stdout);
  Ok(())
}

#[test]
fn test_dry_run_leaves_manifests_untouched() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;
  let before = workspace.read_file("packages/core/package.json")?;

  run_flotilla(&workspace.path, &["publish", "--dry-run"])?;

  assert_eq!(workspace.read_file("packages/core/package.json")?, before);
  Ok(())
}

#[test]
fn test_json_output_reports_batches_and_versions() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.add_package("app", "1.0.0", &[("core", "workspace:*")])?;
  workspace.commit("Add packages")?;

  let output = run_flotilla(&workspace.path, &["publish", "--dry-run", "--json"])?;
  let value: serde_json::Value = serde_json::from_str(&stdout_of(&output))?;

  assert_eq!(value["batches"], serde_json::json!([["core"], ["app"]]));

  let published: Vec<&str> = value["published"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["name"].as_str().unwrap())
    .collect();
  assert_eq!(published, vec!["core", "app"]);
  assert_eq!(value["failure"], serde_json::Value::Null);
  Ok(())
}

#[test]
fn test_feature_branch_skips_with_exit_zero() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;
  workspace.checkout_new_branch("feature/topic")?;

  let output = run_flotilla_raw(&workspace.path, &["publish", "--dry-run"])?;

  assert!(output.status.success(), "skip must exit 0");
  assert!(stderr_of(&output).contains("feature/topic"));
  Ok(())
}

#[test]
fn test_feature_branch_skip_still_emits_json_envelope() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;
  workspace.checkout_new_branch("feature/topic")?;

  let output = run_flotilla_raw(&workspace.path, &["publish", "--dry-run", "--json"])?;

  assert!(output.status.success(), "skip must exit 0");
  let value: serde_json::Value = serde_json::from_str(&stdout_of(&output))?;
  assert_eq!(value["published"], serde_json::json!([]));
  assert_eq!(value["skipped"]["branch"], "feature/topic");
  Ok(())
}

#[test]
fn test_build_command_runs_before_publish() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;

  run_flotilla(
    &workspace.path,
    &["publish", "--dry-run", "--build-command", "printf built > built.txt"],
  )?;

  assert!(workspace.file_exists("packages/core/built.txt"));
  Ok(())
}

#[test]
fn test_failing_build_command_stops_the_run() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;

  let output = run_flotilla_raw(
    &workspace.path,
    &["publish", "--dry-run", "--build-command", "echo no entry point >&2; exit 1"],
  )?;

  assert!(!output.status.success());
  assert!(stderr_of(&output).contains("core"));
  Ok(())
}

#[test]
fn test_dev_branch_produces_prerelease_versions() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;
  workspace.checkout_new_branch("dev")?;

  let output = run_flotilla(&workspace.path, &["publish", "--dry-run"])?;

  // 0.0.0 on the dev line becomes 0.0.1-dev.0
  assert!(stdout_of(&output).contains("core@0.0.1-dev.0"));
  Ok(())
}

#[test]
fn test_monorepo_single_requires_package() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;

  let output = run_flotilla_raw(&workspace.path, &["publish", "--route", "monorepo-single", "--dry-run"])?;

  assert!(!output.status.success());
  assert!(stderr_of(&output).contains("--package"));
  Ok(())
}

#[test]
fn test_monorepo_single_restricts_to_named_package() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.add_package("app", "1.0.0", &[("core", "workspace:*")])?;
  workspace.commit("Add packages")?;

  let output = run_flotilla(
    &workspace.path,
    &[
      "publish",
      "--route",
      "monorepo-single",
      "--package",
      "core",
      "--dry-run",
      "--json",
    ],
  )?;
  let value: serde_json::Value = serde_json::from_str(&stdout_of(&output))?;

  let published: Vec<&str> = value["published"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["name"].as_str().unwrap())
    .collect();
  assert_eq!(published, vec!["core"]);
  Ok(())
}

#[test]
fn test_unknown_bump_level_fails() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;

  let output = run_flotilla_raw(&workspace.path, &["publish", "--bump", "gigantic", "--dry-run"])?;

  assert!(!output.status.success());
  assert!(stderr_of(&output).contains("gigantic"));
  Ok(())
}
