//! `flotilla init` - write a starter flotilla.toml

use crate::core::config::FlotillaConfig;
use crate::core::error::{FlotillaError, FlotillaResult, ResultExt};
use std::path::Path;

pub fn run_init(root: &Path, force: bool) -> FlotillaResult<()> {
  if let Some(existing) = FlotillaConfig::find_config_file(root)
    && !force
  {
    return Err(FlotillaError::with_help(
      format!("Configuration already exists at {}", existing.display()),
      "Pass --force to overwrite it",
    ));
  }

  let path = root.join("flotilla.toml");
  std::fs::write(&path, FlotillaConfig::starter_toml())
    .with_context(|| format!("failed to write {}", path.display()))?;

  println!("✅ Wrote {}", path.display());
  println!("   Edit the packages list to match your workspace layout");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_init_writes_parseable_config() {
    let tmp = TempDir::new().unwrap();
    run_init(tmp.path(), false).unwrap();

    let config = FlotillaConfig::load(tmp.path()).unwrap();
    assert_eq!(config.packages, vec!["packages/*"]);
  }

  #[test]
  fn test_init_refuses_overwrite_without_force() {
    let tmp = TempDir::new().unwrap();
    run_init(tmp.path(), false).unwrap();

    let err = run_init(tmp.path(), false).unwrap_err();
    assert!(matches!(err, FlotillaError::WithHelp { .. }));

    run_init(tmp.path(), true).unwrap();
  }
}
