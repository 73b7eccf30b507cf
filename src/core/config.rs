//! Flotilla configuration (flotilla.toml) parsing and defaults
//!
//! Searched in order: flotilla.toml, .flotilla.toml. Every field has a
//! default so a bare workspace works without any config file; CLI flags
//! override file values at the command layer.

use crate::core::error::{ConfigError, FlotillaError, FlotillaResult, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_CANDIDATES: &[&str] = &["flotilla.toml", ".flotilla.toml"];

/// Default ceiling on the whole change-detection phase, in seconds
pub const DEFAULT_DETECT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlotillaConfig {
  /// Package directories, relative to the root. Entries ending in `/*`
  /// expand to every subdirectory with a manifest. Empty means "use the
  /// root manifest's workspaces array, or the root itself".
  #[serde(default)]
  pub packages: Vec<String>,

  #[serde(default)]
  pub registry: RegistryConfig,

  #[serde(default)]
  pub branches: BranchConfig,

  #[serde(default)]
  pub publish: PublishConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
  /// Registry URL; None means the gateway's default registry
  #[serde(default)]
  pub url: Option<String>,
}

/// Branch names that map to the two release lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
  #[serde(default = "default_main_branch")]
  pub main: String,
  #[serde(default = "default_dev_branch")]
  pub dev: String,
}

fn default_main_branch() -> String {
  "main".to_string()
}

fn default_dev_branch() -> String {
  "dev".to_string()
}

impl Default for BranchConfig {
  fn default() -> Self {
    Self {
      main: default_main_branch(),
      dev: default_dev_branch(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
  /// Distribution tag applied on publish
  #[serde(default = "default_tag")]
  pub tag: String,

  /// Run-wide access level; a manifest declaring something else fails the load
  #[serde(default = "default_access")]
  pub access: String,

  /// Ceiling on the change-detection phase, in seconds
  #[serde(default = "default_detect_timeout")]
  pub detect_timeout_secs: u64,

  /// Command run in each package directory before detection and publish
  #[serde(default)]
  pub build: Option<String>,
}

fn default_tag() -> String {
  "latest".to_string()
}

fn default_access() -> String {
  "public".to_string()
}

fn default_detect_timeout() -> u64 {
  DEFAULT_DETECT_TIMEOUT_SECS
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      tag: default_tag(),
      access: default_access(),
      detect_timeout_secs: default_detect_timeout(),
      build: None,
    }
  }
}

impl FlotillaConfig {
  /// Load configuration from the workspace root, or defaults if no file exists
  pub fn load_or_default(root: &Path) -> FlotillaResult<Self> {
    match Self::find_config_file(root) {
      Some(path) => Self::load_file(&path),
      None => Ok(Self::default()),
    }
  }

  /// Load configuration, failing if no config file exists
  #[allow(dead_code)]
  pub fn load(root: &Path) -> FlotillaResult<Self> {
    let path = Self::find_config_file(root).ok_or(FlotillaError::Config(ConfigError::NotFound {
      path: root.to_path_buf(),
    }))?;
    Self::load_file(&path)
  }

  pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_CANDIDATES
      .iter()
      .map(|name| root.join(name))
      .find(|p| p.exists())
  }

  fn load_file(path: &Path) -> FlotillaResult<Self> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    toml_edit::de::from_str(&content)
      .map_err(|e| FlotillaError::Config(ConfigError::Invalid { reason: e.to_string() }))
  }

  /// Starter config written by `flotilla init`
  pub fn starter_toml() -> &'static str {
    r#"# flotilla configuration

# Package directories. Entries ending in /* expand to every subdirectory
# holding a package.json. Leave empty to use the root manifest's
# "workspaces" array.
packages = ["packages/*"]

[registry]
# url = "https://registry.npmjs.org"

[branches]
main = "main"
dev = "dev"

[publish]
tag = "latest"
access = "public"
detect_timeout_secs = 300
# Command run in each package directory before detection and publish
# build = "npm run build"
"#
  }
}
