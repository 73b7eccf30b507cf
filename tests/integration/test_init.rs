//! Tests for the `init` command

use crate::helpers::*;
use anyhow::Result;
use tempfile::TempDir;

#[test]
fn test_init_creates_config() -> Result<()> {
  let temp = TempDir::new()?;

  run_flotilla(temp.path(), &["init"])?;

  assert!(temp.path().join("flotilla.toml").exists());
  let config = std::fs::read_to_string(temp.path().join("flotilla.toml"))?;
  assert!(config.contains("packages"));
  assert!(config.contains("[branches]"));
  assert!(config.contains("[publish]"));
  Ok(())
}

#[test]
fn test_init_refuses_existing_config() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  assert!(workspace.file_exists("flotilla.toml"));

  let output = run_flotilla_raw(&workspace.path, &["init"])?;
  assert!(!output.status.success());
  assert!(stderr_of(&output).contains("already exists"));
  Ok(())
}

#[test]
fn test_init_force_overwrites() -> Result<()> {
  let workspace = TestWorkspace::new()?;
  let before = workspace.read_file("flotilla.toml")?;

  run_flotilla(&workspace.path, &["init", "--force"])?;

  let after = workspace.read_file("flotilla.toml")?;
  assert_ne!(before, after);
  assert!(after.contains("detect_timeout_secs"));
  Ok(())
}
