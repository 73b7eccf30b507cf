//! Tests for the `affected` command

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_affected_includes_dependents() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.add_package("app", "1.0.0", &[("core", "workspace:*")])?;
  workspace.commit("Add packages")?;

  workspace.modify_file("core", "src/index.js", "module.exports = () => 'changed';\n")?;
  workspace.commit("Change core")?;

  let output = run_flotilla(
    &workspace.path,
    &["affected", "--since", "HEAD~1", "--format", "names-only"],
  )?;
  let stdout = stdout_of(&output);
  let names: Vec<&str> = stdout.lines().map(str::trim).collect();

  assert!(names.contains(&"core"));
  assert!(names.contains(&"app"));
  Ok(())
}

#[test]
fn test_affected_excludes_unrelated_packages() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.add_package("app", "1.0.0", &[("core", "workspace:*")])?;
  workspace.commit("Add packages")?;

  // app changed; core does not depend on app, so it stays out
  workspace.modify_file("app", "src/index.js", "module.exports = () => 'changed';\n")?;
  workspace.commit("Change app")?;

  let output = run_flotilla(
    &workspace.path,
    &["affected", "--since", "HEAD~1", "--format", "names-only"],
  )?;
  let stdout = stdout_of(&output);

  assert!(stdout.contains("app"));
  assert!(!stdout.contains("core"));
  Ok(())
}

#[test]
fn test_affected_json_output() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.add_package("app", "1.0.0", &[("core", "workspace:*")])?;
  workspace.commit("Add packages")?;

  workspace.modify_file("core", "src/index.js", "module.exports = () => 'changed';\n")?;
  workspace.commit("Change core")?;

  let output = run_flotilla(
    &workspace.path,
    &["affected", "--since", "HEAD~1", "--format", "json"],
  )?;

  let value: serde_json::Value = serde_json::from_str(&stdout_of(&output))?;
  assert_eq!(value["direct"], serde_json::json!(["core"]));
  assert_eq!(value["dependents"], serde_json::json!(["app"]));
  Ok(())
}

#[test]
fn test_affected_rejects_unknown_format() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  workspace.add_package("core", "1.0.0", &[])?;
  workspace.commit("Add package")?;

  let output = run_flotilla_raw(
    &workspace.path,
    &["affected", "--since", "HEAD", "--format", "yaml"],
  )?;

  assert!(!output.status.success());
  assert!(stderr_of(&output).contains("Unknown format"));
  Ok(())
}
