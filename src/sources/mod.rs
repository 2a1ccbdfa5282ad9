// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Remote data source adapters (GitHub REST, Jenkins JSON, local git mirror) behind small seams
// role: sources/root
// outputs: Fetched<T>, commit shapes shared by fingerprinting, CommitSource seam
// invariants:
// - Adapters return typed FetchError outcomes; no adapter retries or swallows failures
// - Per-record Data errors are collected in Fetched::skipped; the fetch continues
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

pub mod github;
pub mod gitmirror;
pub mod jenkins;
pub mod transport;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::FetchError;

/// Unreserved characters stay; `/`, `#`, `?`, `%` and the rest are escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Escape a branch or job name for use as a single URL path segment.
pub fn escape_segment(name: &str) -> String {
  utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Rows from one list fetch plus the reasons any malformed records were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
  pub rows: Vec<T>,
  pub skipped: Vec<String>,
}

impl<T> Default for Fetched<T> {
  fn default() -> Self {
    Self {
      rows: Vec::new(),
      skipped: Vec::new(),
    }
  }
}

impl<T> Fetched<T> {
  /// Push the parsed record, or remember why it was dropped.
  pub fn absorb(&mut self, parsed: Result<Option<T>, FetchError>) {
    match parsed {
      Ok(Some(row)) => self.rows.push(row),
      Ok(None) => {}
      Err(e) => self.skipped.push(e.to_string()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
  pub sha: String,
  pub parents: usize,
  /// Committer date, when the source reports one.
  pub committed_at: Option<DateTime<Utc>>,
}

impl CommitSummary {
  pub fn is_merge(&self) -> bool {
    self.parents > 1
  }
}

/// One file touched by a commit. `patch` is the unified diff body; `blob` the post-image object id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
  pub path: String,
  pub patch: Option<String>,
  pub blob: Option<String>,
  pub binary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDiff {
  pub sha: String,
  pub parents: usize,
  pub files: Vec<FileChange>,
}

/// Read access to one repository's commit graph, as needed by the sync comparator.
pub trait CommitSource: Send + Sync {
  /// Tip commit id of `reference`; `NotFound` when the branch does not exist.
  fn tip(&self, reference: &str) -> Result<String, FetchError>;

  /// Every commit reachable from `reference`, newest first; optionally only those committed after `since`.
  fn commits(&self, reference: &str, since: Option<DateTime<Utc>>) -> Result<Vec<CommitSummary>, FetchError>;

  /// The newest `limit` commits reachable from `reference`.
  fn head_commits(&self, reference: &str, limit: usize) -> Result<Vec<CommitSummary>, FetchError>;

  fn diff(&self, sha: &str) -> Result<CommitDiff, FetchError>;
}
