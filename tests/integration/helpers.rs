//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A test workspace with git history and npm-style packages
pub struct TestWorkspace {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestWorkspace {
  /// Create a new test workspace with basic structure
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;

    std::fs::write(
      path.join("flotilla.toml"),
      r#"packages = ["packages/*"]

# Nothing listens here: registry lookups fail fast and every package is
# treated as never published, keeping tests offline and deterministic.
[registry]
url = "http://127.0.0.1:1"

[branches]
main = "main"
dev = "dev"
"#,
    )?;

    std::fs::write(
      path.join("package.json"),
      r#"{
  "name": "test-workspace",
  "private": true,
  "workspaces": ["packages/*"]
}
"#,
    )?;

    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "Initial workspace setup"])?;

    Ok(Self { _root: root, path })
  }

  /// Add a package to the workspace
  pub fn add_package(&self, name: &str, version: &str, deps: &[(&str, &str)]) -> Result<PathBuf> {
    let pkg_path = self.path.join("packages").join(name);
    std::fs::create_dir_all(pkg_path.join("src"))?;

    let mut dep_entries: Vec<String> = Vec::new();
    for (dep_name, dep_spec) in deps {
      dep_entries.push(format!("    \"{}\": \"{}\"", dep_name, dep_spec));
    }

    std::fs::write(
      pkg_path.join("package.json"),
      format!(
        "{{\n  \"name\": \"{}\",\n  \"version\": \"{}\",\n  \"dependencies\": {{\n{}\n  }}\n}}\n",
        name,
        version,
        dep_entries.join(",\n")
      ),
    )?;

    std::fs::write(
      pkg_path.join("src").join("index.js"),
      format!("module.exports = () => 'hello from {}';\n", name),
    )?;

    Ok(pkg_path)
  }

  /// Commit current changes
  pub fn commit(&self, message: &str) -> Result<String> {
    git(&self.path, &["add", "."])?;
    git(&self.path, &["commit", "-m", message])?;

    let output = git(&self.path, &["rev-parse", "HEAD"])?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Modify a file inside a package
  pub fn modify_file(&self, package: &str, file: &str, content: &str) -> Result<()> {
    let file_path = self.path.join("packages").join(package).join(file);
    std::fs::write(file_path, content)?;
    Ok(())
  }

  /// Switch to a new branch
  pub fn checkout_new_branch(&self, name: &str) -> Result<()> {
    git(&self.path, &["checkout", "-b", name])?;
    Ok(())
  }

  pub fn file_exists(&self, path: &str) -> bool {
    self.path.join(path).exists()
  }

  pub fn read_file(&self, path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(self.path.join(path))?)
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run the flotilla CLI, failing the test on non-zero exit
pub fn run_flotilla(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_flotilla_raw(cwd, args)?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "flotilla command failed: flotilla {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// Run the flotilla CLI, returning the output whatever the exit status
pub fn run_flotilla_raw(cwd: &Path, args: &[&str]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_flotilla");

  Command::new(bin)
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run flotilla")
}

pub fn stdout_of(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr_of(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).to_string()
}
