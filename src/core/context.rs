//! Unified run context - build once, pass everywhere
//!
//! RunContext bundles the workspace root, configuration, and the two
//! collaborator gateways. Both gateways sit behind traits and are injected
//! here, so commands and the orchestrator never touch process-wide state
//! and tests substitute in-memory fakes.

use crate::core::config::FlotillaConfig;
use crate::core::error::{FlotillaResult, ResultExt};
use crate::registry::{RegistryGateway, SystemNpm};
use crate::vcs::{SourceControlGateway, SystemGit};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared state for one flotilla invocation
#[derive(Clone)]
pub struct RunContext {
  /// Workspace root directory (absolute path)
  pub root: PathBuf,

  /// flotilla.toml settings (or defaults if no file exists)
  pub config: FlotillaConfig,

  /// Registry collaborator
  pub registry: Arc<dyn RegistryGateway>,

  /// Source-control collaborator
  pub vcs: Arc<dyn SourceControlGateway>,
}

impl RunContext {
  /// Build a context with the system npm/git gateways.
  ///
  /// The root is canonicalized up front: git reports changed paths under
  /// the resolved repository toplevel, and every package path derived here
  /// must compare against those, so a relative or symlinked `--root` is
  /// resolved once rather than leaking through the whole run.
  pub fn build(root: &Path) -> FlotillaResult<Self> {
    let root = std::fs::canonicalize(root)
      .with_context(|| format!("failed to resolve workspace root {}", root.display()))?;

    let config = FlotillaConfig::load_or_default(&root)?;
    let registry: Arc<dyn RegistryGateway> = Arc::new(SystemNpm::new(config.registry.url.clone()));
    let vcs: Arc<dyn SourceControlGateway> = Arc::new(SystemGit::open(&root)?);

    Ok(Self {
      root,
      config,
      registry,
      vcs,
    })
  }
}
