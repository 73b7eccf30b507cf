//! Dependency specifier parsing and classification
//!
//! A single tagged-variant parser is the one source of truth for "is this
//! dependency specifier safe to publish". Validation and classification
//! share it; there are no duplicated pattern checks elsewhere.
//!
//! Accepted: workspace markers, exact versions, ranges (caret, tilde,
//! comparators, conjunctions, `||` alternatives, hyphen ranges, `1.x`),
//! dist-tags (`latest`, `next`, ...), and the wildcard `*`.
//!
//! Rejected: anything anchored to a filesystem path, a symlink/portal, a
//! source-control URL, or a bare network URL. A registry-based publish
//! cannot resolve those, so they fail the load before any build work.

use semver::{Version, VersionReq};
use std::fmt;

/// Specifier prefixes that can never be published to a registry
const REJECTED_PREFIXES: &[&str] = &[
  "file:", "link:", "portal:", "git:", "git+", "github:", "http://", "https://", "ssh://",
];

/// A parsed dependency specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier {
  /// `workspace:` marker; the inner part is what follows the colon
  /// (`*`, `^`, `~`, or an explicit version/range)
  Workspace(String),
  /// Exact semantic version, e.g. `1.2.3`
  Exact(Version),
  /// Version range, kept as declared, e.g. `^1.2.0`, `>=1, <2`, `1.x`
  Range(String),
  /// Dist-tag keyword, e.g. `latest`, `next`
  DistTag(String),
  /// Anything goes
  Wildcard,
}

impl Specifier {
  /// Parse and validate a raw specifier string.
  ///
  /// Returns the reason text on rejection; callers wrap it into a
  /// `ManifestError::InvalidSpecifier` with package context.
  pub fn parse(raw: &str) -> Result<Self, String> {
    let raw = raw.trim();

    if raw.is_empty() {
      return Err("empty specifier".to_string());
    }

    if let Some(inner) = raw.strip_prefix("workspace:") {
      return Self::parse_workspace(inner);
    }

    for prefix in REJECTED_PREFIXES {
      if raw.starts_with(prefix) {
        return Err(format!(
          "'{}' specifiers cannot be resolved by a registry publish",
          prefix
        ));
      }
    }

    if raw == "*" {
      return Ok(Specifier::Wildcard);
    }

    if let Ok(version) = Version::parse(raw) {
      return Ok(Specifier::Exact(version));
    }

    if Self::is_valid_range(raw) {
      return Ok(Specifier::Range(raw.to_string()));
    }

    // Bare `user/repo` is a source-control shorthand, not a dist-tag
    if raw.contains('/') || raw.contains('\\') {
      return Err("repository shorthand cannot be resolved by a registry publish".to_string());
    }

    if Self::is_dist_tag(raw) {
      return Ok(Specifier::DistTag(raw.to_string()));
    }

    Err("not a version, range, dist-tag, or workspace marker".to_string())
  }

  /// `workspace:` markers always denote an internal dependency
  pub fn is_workspace(&self) -> bool {
    matches!(self, Specifier::Workspace(_))
  }

  fn parse_workspace(inner: &str) -> Result<Self, String> {
    match inner {
      "*" | "^" | "~" => Ok(Specifier::Workspace(inner.to_string())),
      other if Version::parse(other).is_ok() || Self::is_valid_range(other) => {
        Ok(Specifier::Workspace(other.to_string()))
      }
      other => Err(format!("invalid workspace marker 'workspace:{}'", other)),
    }
  }

  /// Minimal range validation: enough to decide publish safety, not full
  /// range satisfaction. `||` alternatives and hyphen ranges are split and
  /// each side validated on its own.
  fn is_valid_range(raw: &str) -> bool {
    raw.split("||").all(|alt| {
      let alt = alt.trim();
      if alt.is_empty() {
        return false;
      }

      if let Some((lo, hi)) = alt.split_once(" - ") {
        return Self::is_loose_version(lo.trim()) && Self::is_loose_version(hi.trim());
      }

      if VersionReq::parse(alt).is_ok() {
        return true;
      }

      // Space-separated comparator conjunctions, e.g. `>=1.2.0 <2.0.0`
      let parts: Vec<&str> = alt.split_whitespace().collect();
      parts.len() > 1 && parts.iter().all(|p| VersionReq::parse(p).is_ok())
    })
  }

  /// Partial versions like `1` or `1.2` used as hyphen-range endpoints
  fn is_loose_version(s: &str) -> bool {
    !s.is_empty()
      && s
        .split('.')
        .all(|part| part == "x" || part == "X" || part.parse::<u64>().is_ok())
  }

  /// Dist-tags start with a letter and contain only word-ish characters
  fn is_dist_tag(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
      Some(c) if c.is_ascii_alphabetic() => {}
      _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
  }
}

impl fmt::Display for Specifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Specifier::Workspace(inner) => write!(f, "workspace:{}", inner),
      Specifier::Exact(v) => write!(f, "{}", v),
      Specifier::Range(r) => write!(f, "{}", r),
      Specifier::DistTag(t) => write!(f, "{}", t),
      Specifier::Wildcard => write!(f, "*"),
    }
  }
}
