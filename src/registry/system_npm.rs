//! System npm backend - registry access via the npm CLI
//!
//! Uses npm plumbing commands for all registry operations:
//! - `npm view` for published version + tarball lookups
//! - `npm pack` for building local artifacts and fetching published ones
//! - `npm publish` for the publish step itself
//!
//! Subprocesses run with an isolated environment (whitelisted PATH/HOME)
//! so ambient npm configuration cannot change publish behavior. The auth
//! token comes from the process environment and is attached as the
//! registry `_authToken` when present.
//!
//! Lookups, packs, and downloads run under a deadline: the child is
//! polled and killed once the deadline passes, so one hung npm process
//! cannot stall a whole run. `npm publish` is the exception and runs to
//! completion; killing it mid-flight can leave a half-announced release.

use crate::core::error::{FlotillaError, FlotillaResult, RegistryError, ResultExt};
use crate::manifest::AccessLevel;
use crate::registry::{PackageInfo, RegistryGateway};
use semver::Version;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Ceiling on registry lookups that run outside the detection deadline
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// How often a running child is polled against its deadline
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Environment variable holding the registry auth token
pub const TOKEN_ENV_VAR: &str = "NPM_TOKEN";

pub struct SystemNpm {
  registry_url: String,
  auth_token: Option<String>,
}

impl SystemNpm {
  /// Create a gateway against the given registry (default: npmjs.org),
  /// picking up the auth token from the process environment.
  pub fn new(registry_url: Option<String>) -> Self {
    Self {
      registry_url: registry_url.unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
      auth_token: std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty()),
    }
  }

  /// Create a safe npm command with isolated environment
  ///
  /// - Clears environment variables, whitelists only PATH and HOME
  /// - Pins the registry URL
  /// - Attaches the auth token as a bearer credential when present
  fn npm_cmd(&self, cwd: &Path) -> Command {
    let mut cmd = Command::new("npm");
    cmd.current_dir(cwd);

    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
      cmd.env("PATH", path);
    }
    if let Ok(home) = std::env::var("HOME") {
      cmd.env("HOME", home);
    }

    cmd.arg(format!("--registry={}", self.registry_url));
    if let Some(token) = &self.auth_token {
      // npm credential key: //host/path/:_authToken
      let host_part = self
        .registry_url
        .trim_start_matches("https:")
        .trim_start_matches("http:")
        .trim_end_matches('/');
      cmd.arg(format!("--{}/:_authToken={}", host_part, token));
    }

    cmd
  }

  fn run(&self, cwd: &Path, args: &[&str]) -> FlotillaResult<std::process::Output> {
    self
      .npm_cmd(cwd)
      .args(args)
      .output()
      .with_context(|| format!("failed to execute npm {}", args.first().unwrap_or(&"")))
  }

  fn run_bounded(&self, cwd: &Path, args: &[&str], deadline: Instant) -> FlotillaResult<std::process::Output> {
    let mut cmd = self.npm_cmd(cwd);
    cmd.args(args);
    let label = format!("npm {}", args.first().unwrap_or(&""));
    run_command_bounded(cmd, &label, deadline)
  }
}

/// Run a command to completion or kill it at `deadline`.
///
/// The child is polled rather than waited on; a kill also releases a child
/// blocked writing to a full output pipe.
pub(crate) fn run_command_bounded(
  mut cmd: Command,
  label: &str,
  deadline: Instant,
) -> FlotillaResult<std::process::Output> {
  let mut child = cmd
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .with_context(|| format!("failed to execute {}", label))?;

  loop {
    let exited = child
      .try_wait()
      .with_context(|| format!("failed to poll {}", label))?;
    if exited.is_some() {
      return child
        .wait_with_output()
        .with_context(|| format!("failed to collect output of {}", label));
    }

    if Instant::now() >= deadline {
      let _ = child.kill();
      let _ = child.wait();
      return Err(
        RegistryError::CommandFailed {
          command: label.to_string(),
          stderr: "timed out and was killed".to_string(),
        }
        .into(),
      );
    }

    std::thread::sleep(POLL_INTERVAL);
  }
}

impl RegistryGateway for SystemNpm {
  fn fetch_package_info(&self, name: &str) -> FlotillaResult<PackageInfo> {
    let output = self.run_bounded(
      Path::new("."),
      &["view", name, "version", "dist.tarball", "--json"],
      Instant::now() + LOOKUP_TIMEOUT,
    )?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      // Unknown package: first publish, not an error
      if stderr.contains("E404") || stderr.contains("404 Not Found") {
        return Ok(PackageInfo::unpublished());
      }
      return Err(
        RegistryError::FetchFailed {
          package: name.to_string(),
          reason: stderr.trim().to_string(),
        }
        .into(),
      );
    }

    parse_view_output(name, &String::from_utf8_lossy(&output.stdout))
  }

  fn download_artifact(&self, reference: &str, dest_dir: &Path, deadline: Instant) -> FlotillaResult<PathBuf> {
    let dest = dest_dir.to_string_lossy().to_string();
    let output = self.run_bounded(
      dest_dir,
      &["pack", reference, "--pack-destination", &dest, "--json"],
      deadline,
    )?;

    if !output.status.success() {
      return Err(
        RegistryError::DownloadFailed {
          reference: reference.to_string(),
          reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into(),
      );
    }

    packed_tarball_path(dest_dir, &String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
      RegistryError::DownloadFailed {
        reference: reference.to_string(),
        reason: "npm pack produced no tarball".to_string(),
      }
      .into()
    })
  }

  fn pack(&self, package_dir: &Path, dest_dir: &Path, deadline: Instant) -> FlotillaResult<PathBuf> {
    let dest = dest_dir.to_string_lossy().to_string();
    let output = self.run_bounded(package_dir, &["pack", "--pack-destination", &dest, "--json"], deadline)?;

    if !output.status.success() {
      return Err(
        RegistryError::CommandFailed {
          command: format!("npm pack ({})", package_dir.display()),
          stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into(),
      );
    }

    packed_tarball_path(dest_dir, &String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
      RegistryError::CommandFailed {
        command: format!("npm pack ({})", package_dir.display()),
        stderr: "npm pack produced no tarball".to_string(),
      }
      .into()
    })
  }

  fn publish(&self, package_dir: &Path, tag: &str, access: AccessLevel) -> FlotillaResult<()> {
    let tag_arg = format!("--tag={}", tag);
    let access_arg = format!("--access={}", access);
    let output = self.run(package_dir, &["publish", &tag_arg, &access_arg])?;

    if !output.status.success() {
      return Err(
        RegistryError::CommandFailed {
          command: format!("npm publish ({})", package_dir.display()),
          stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into(),
      );
    }

    Ok(())
  }
}

/// Parse `npm view <name> version dist.tarball --json` output.
///
/// npm emits either an object keyed by field name, or (for a single field)
/// a bare string; with multiple dist-tags it can emit an array.
fn parse_view_output(name: &str, stdout: &str) -> FlotillaResult<PackageInfo> {
  let stdout = stdout.trim();
  if stdout.is_empty() {
    return Ok(PackageInfo::unpublished());
  }

  let parsed: Value = serde_json::from_str(stdout).map_err(|e| {
    FlotillaError::Registry(RegistryError::FetchFailed {
      package: name.to_string(),
      reason: format!("unparsable npm view output: {}", e),
    })
  })?;

  // Array form: take the last (latest) entry
  let entry = match &parsed {
    Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
    other => other.clone(),
  };

  let version_str = entry
    .get("version")
    .and_then(Value::as_str)
    .map(str::to_string)
    .or_else(|| entry.as_str().map(str::to_string));

  let Some(version_str) = version_str else {
    return Ok(PackageInfo::unpublished());
  };

  let version = Version::parse(&version_str).map_err(|e| {
    FlotillaError::Registry(RegistryError::FetchFailed {
      package: name.to_string(),
      reason: format!("registry returned unparsable version '{}': {}", version_str, e),
    })
  })?;

  let artifact = entry
    .get("dist.tarball")
    .or_else(|| entry.get("dist").and_then(|d| d.get("tarball")))
    .and_then(Value::as_str)
    .map(str::to_string);

  Ok(PackageInfo { version, artifact })
}

/// Resolve the tarball filename reported by `npm pack --json`
fn packed_tarball_path(dest_dir: &Path, stdout: &str) -> Option<PathBuf> {
  let parsed: Value = serde_json::from_str(stdout.trim()).ok()?;
  let filename = parsed
    .as_array()?
    .first()?
    .get("filename")
    .and_then(Value::as_str)?;
  // npm reports scoped names as @scope/pkg-1.0.0.tgz but writes @scope-pkg-1.0.0.tgz
  let filename = filename.trim_start_matches('@').replace('/', "-");
  let path = dest_dir.join(filename);
  path.exists().then_some(path)
}
