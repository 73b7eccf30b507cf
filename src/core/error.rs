//! Error types for flotilla
//!
//! One crate-wide taxonomy with nested domain errors. The split matters for
//! recovery policy:
//!
//! - `Manifest`, `CircularDependency`: fatal before any publish starts
//! - `NotPublishableBranch`: a skip, not a failure (exit code 0)
//! - `UnresolvedDependency`, `PublishFailed`: fatal for the affected batch;
//!   earlier batches stand (registry publishes are not revocable)
//! - `Registry`: recovered inside change detection, fatal during publish
//!
//! Exit codes separate user mistakes (1) from system failures (2) and
//! workspace validation failures (3), so CI can branch on the class.

use std::path::PathBuf;
use thiserror::Error;

pub type FlotillaResult<T> = Result<T, FlotillaError>;

/// Exit code classes for failed runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (bad flags, bad config, malformed manifests)
  User = 1,
  /// System error (registry, git, I/O)
  System = 2,
  /// Workspace validation failure (cycles, unresolvable versions)
  Validation = 3,
}

impl ExitCode {
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

#[derive(Debug, Error)]
pub enum FlotillaError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("branch '{branch}' is neither the main nor the dev branch; nothing to publish")]
  NotPublishableBranch { branch: String },

  #[error("dependency cycle detected among packages: {}", packages.join(", "))]
  CircularDependency { packages: Vec<String> },

  #[error("package '{package}': no resolvable version for internal dependency '{dependency}'")]
  UnresolvedDependency { package: String, dependency: String },

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("failed to publish {package}@{version}: {reason}")]
  PublishFailed {
    package: String,
    version: String,
    reason: String,
  },

  #[error("{0}")]
  Message(String),

  #[error("{message}")]
  WithHelp { message: String, help: String },

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl FlotillaError {
  /// Free-form error message
  pub fn message(msg: impl Into<String>) -> Self {
    FlotillaError::Message(msg.into())
  }

  /// Error with a follow-up suggestion shown below the message
  pub fn with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
    FlotillaError::WithHelp {
      message: message.into(),
      help: help.into(),
    }
  }

  /// A "skip" outcome rather than a failure: the run produced an empty
  /// result on purpose and the process should exit 0.
  pub fn is_skip(&self) -> bool {
    matches!(self, FlotillaError::NotPublishableBranch { .. })
  }

  pub fn exit_code(&self) -> i32 {
    if self.is_skip() {
      return 0;
    }
    self.class().as_i32()
  }

  fn class(&self) -> ExitCode {
    match self {
      FlotillaError::Manifest(_)
      | FlotillaError::Config(_)
      | FlotillaError::Message(_)
      | FlotillaError::WithHelp { .. } => ExitCode::User,
      FlotillaError::Registry(_)
      | FlotillaError::PublishFailed { .. }
      | FlotillaError::Io(_)
      | FlotillaError::Json(_) => ExitCode::System,
      FlotillaError::CircularDependency { .. } | FlotillaError::UnresolvedDependency { .. } => {
        ExitCode::Validation
      }
      // Skips are handled before classification
      FlotillaError::NotPublishableBranch { .. } => ExitCode::User,
    }
  }
}

/// Malformed or invalid manifest content. Always fatal before publish.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("manifest not found at {path}")]
  NotFound { path: PathBuf },

  #[error("failed to parse manifest {path}: {reason}")]
  Parse { path: PathBuf, reason: String },

  #[error("manifest {path} is missing the \"name\" field")]
  MissingName { path: PathBuf },

  #[error("package '{package}': dependency '{dependency}' has invalid specifier '{specifier}': {reason}")]
  InvalidSpecifier {
    package: String,
    dependency: String,
    specifier: String,
    reason: String,
  },

  #[error("package '{package}' declares access '{found}' but this run publishes with access '{expected}'")]
  AccessMismatch {
    package: String,
    expected: String,
    found: String,
  },
}

/// Registry communication failures
#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("registry command failed: {command}: {stderr}")]
  CommandFailed { command: String, stderr: String },

  #[error("failed to fetch registry info for '{package}': {reason}")]
  FetchFailed { package: String, reason: String },

  #[error("failed to download artifact '{reference}': {reason}")]
  DownloadFailed { reference: String, reason: String },

  #[error("artifact '{reference}' is {size} bytes, over the {limit} byte comparison limit")]
  ArtifactTooLarge {
    reference: String,
    size: u64,
    limit: u64,
  },
}

/// flotilla.toml problems
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("no flotilla.toml found under {path}")]
  NotFound { path: PathBuf },

  #[error("invalid flotilla.toml: {reason}")]
  Invalid { reason: String },
}

/// Attach context to any error, collapsing it into a message
pub trait ResultExt<T> {
  fn context(self, msg: &str) -> FlotillaResult<T>;
  fn with_context<F: FnOnce() -> String>(self, f: F) -> FlotillaResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
  fn context(self, msg: &str) -> FlotillaResult<T> {
    self.map_err(|e| FlotillaError::message(format!("{}: {}", msg, e)))
  }

  fn with_context<F: FnOnce() -> String>(self, f: F) -> FlotillaResult<T> {
    self.map_err(|e| FlotillaError::message(format!("{}: {}", f(), e)))
  }
}

/// Render an error for the terminal, including any help text
pub fn print_error(err: &FlotillaError) {
  if err.is_skip() {
    eprintln!("⏭️  {}", err);
    return;
  }

  eprintln!("❌ Error: {}", err);

  if let FlotillaError::WithHelp { help, .. } = err {
    eprintln!();
    eprintln!("   {}", help);
  }
}
