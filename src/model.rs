// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Define the report model (repositories, branch specs, PR/build/sync rows, grouped entries) shared by engine and rendering
// role: model/types
// outputs: Serializable structs with stable field names; Record trait for identity/timestamp ordering
// invariants: Records are immutable once built; identity is (repository, url) for PRs and builds, (repository, branch) for verdicts
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{BranchStatus, RepoStatus};
use crate::window::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryRef {
  pub owner: String,
  pub name: String,
}

impl RepositoryRef {
  pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      name: name.into(),
    }
  }
}

impl fmt::Display for RepositoryRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.owner, self.name)
  }
}

/// How a configured branch entry expands into concrete names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchSpec {
  Literal(String),
  /// `prefix/*`; the stored prefix includes the trailing `/`.
  Pattern(String),
  Dynamic,
}

impl BranchSpec {
  pub fn as_str(&self) -> String {
    match self {
      BranchSpec::Literal(name) => name.clone(),
      BranchSpec::Pattern(prefix) => format!("{}*", prefix),
      BranchSpec::Dynamic => "dynamic".into(),
    }
  }
}

impl FromStr for BranchSpec {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();

    if s.is_empty() {
      return Err("empty branch spec".into());
    }
    if s.eq_ignore_ascii_case("dynamic") {
      return Ok(BranchSpec::Dynamic);
    }
    if let Some(prefix) = s.strip_suffix('*') {
      if prefix.is_empty() || !prefix.ends_with('/') || prefix.contains('*') {
        return Err(format!("unsupported pattern `{}` (expected `prefix/*`)", s));
      }
      return Ok(BranchSpec::Pattern(prefix.to_string()));
    }
    if s.contains('*') {
      return Err(format!("unsupported pattern `{}` (expected `prefix/*`)", s));
    }

    Ok(BranchSpec::Literal(s.to_string()))
  }
}

impl Serialize for BranchSpec {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.as_str())
  }
}

impl<'de> Deserialize<'de> for BranchSpec {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

/// A report row: something with a stable identity and (usually) a timestamp.
pub trait Record {
  fn identity(&self) -> &str;
  fn timestamp(&self) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PullRequestRecord {
  pub repository: RepositoryRef,
  pub number: i64,
  pub title: String,
  /// Display name when the user profile has one, otherwise the login.
  pub author: String,
  pub author_login: String,
  pub merged_at: DateTime<Utc>,
  pub url: String,
}

impl Record for PullRequestRecord {
  fn identity(&self) -> &str {
    &self.url
  }

  fn timestamp(&self) -> Option<DateTime<Utc>> {
    Some(self.merged_at)
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildResult {
  Success,
  Failure,
  Aborted,
  Unstable,
  Unknown,
}

impl BuildResult {
  /// Closed-set mapping; anything unrecognized (including a running build's null) is `Unknown`.
  pub fn from_raw(raw: Option<&str>) -> Self {
    match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
      Some("SUCCESS") => BuildResult::Success,
      Some("FAILURE") => BuildResult::Failure,
      Some("ABORTED") => BuildResult::Aborted,
      Some("UNSTABLE") => BuildResult::Unstable,
      _ => BuildResult::Unknown,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      BuildResult::Success => "SUCCESS",
      BuildResult::Failure => "FAILURE",
      BuildResult::Aborted => "ABORTED",
      BuildResult::Unstable => "UNSTABLE",
      BuildResult::Unknown => "UNKNOWN",
    }
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BuildRecord {
  pub repository: RepositoryRef,
  /// Unescaped branch or tag name.
  pub branch: String,
  pub number: i64,
  pub result: BuildResult,
  pub timestamp: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<i64>,
  pub url: String,
}

impl Record for BuildRecord {
  fn identity(&self) -> &str {
    &self.url
  }

  fn timestamp(&self) -> Option<DateTime<Utc>> {
    Some(self.timestamp)
  }
}

/// Whether every baseline change has reached `branch`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SyncVerdict {
  pub repository: RepositoryRef,
  pub branch: String,
  pub synced: bool,
  pub baseline_commits: usize,
  pub branch_commits: usize,
  /// Commits whose content fingerprint could not be computed.
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub unresolved: Vec<String>,
}

impl Record for SyncVerdict {
  fn identity(&self) -> &str {
    &self.branch
  }

  fn timestamp(&self) -> Option<DateTime<Utc>> {
    None
  }
}

/// An organization repository as listed by the hosting API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RepositoryListing {
  pub name: String,
  pub url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_branch: Option<String>,
}

/// Organization repository listing, filtered by name prefix.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrgListing {
  pub organization: String,
  pub generated_at: DateTime<Utc>,
  pub repositories: Vec<RepositoryListing>,
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub skipped: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BranchGroup<R> {
  pub name: String,
  pub status: BranchStatus,
  pub rows: Vec<R>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportEntry<R> {
  pub repository: RepositoryRef,
  pub status: RepoStatus,
  pub groups: Vec<BranchGroup<R>>,
}

impl<R> ReportEntry<R> {
  pub fn row_count(&self) -> usize {
    self.groups.iter().map(|g| g.rows.len()).sum()
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
  Prs,
  Builds,
  Sync,
}

impl ReportKind {
  pub fn title(&self) -> &'static str {
    match self {
      ReportKind::Prs => "Merged Pull Requests",
      ReportKind::Builds => "CI Build Report",
      ReportKind::Sync => "Branch Sync Report",
    }
  }
}

/// A record that was dropped because its payload was malformed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
  pub repository: RepositoryRef,
  pub branch: String,
  pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Report<R> {
  pub kind: ReportKind,
  pub generated_at: DateTime<Utc>,
  pub window: TimeWindow,
  pub baseline: String,
  pub entries: Vec<ReportEntry<R>>,
  pub statuses: BTreeMap<String, RepoStatus>,
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub skipped: Vec<SkippedRecord>,
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub warnings: Vec<String>,
}

impl<R> Report<R> {
  pub fn total_rows(&self) -> usize {
    self.entries.iter().map(|e| e.row_count()).sum()
  }
}
