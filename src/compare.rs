// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Decide whether every baseline change has reached a candidate branch
// role: compare/sync
// inputs: CommitSource for one repository; baseline and candidate branch names; TimeWindow (prefix fallback)
// outputs: PatchIdentitySet per branch; SyncVerdict rows
// invariants:
// - synced = baseline.fingerprints ⊆ branch.fingerprints and every unresolved baseline commit id is reachable from the branch
// - Merge commits and empty commits are excluded on both sides
// - A commit whose diff cannot be fetched or parsed is unresolved, never silently dropped
// - Fingerprints are memoized by commit id for the lifetime of one Comparator (one repository)
// - Auth failures propagate; every other per-commit failure marks the commit unresolved
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::fingerprint::fingerprint;
use crate::model::{RepositoryRef, SyncVerdict};
use crate::sources::{CommitSource, CommitSummary};
use crate::util::short_sha;
use crate::window::TimeWindow;

/// How branch sync is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
  /// Content fingerprints of every reachable commit.
  #[default]
  Fingerprint,
  /// Any recent baseline commit id among the branch's newest 100 commits.
  Prefix,
}

pub const PREFIX_LEN: usize = 7;
pub const PREFIX_SCAN_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identity {
  Fingerprint(String),
  Excluded,
  Unresolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchIdentitySet {
  pub fingerprints: HashSet<String>,
  pub commit_ids: HashSet<String>,
  /// Commit ids (reachable, not merges) whose fingerprint could not be computed.
  pub unresolved: BTreeSet<String>,
  pub commits: usize,
}

impl PatchIdentitySet {
  /// Has every change in `baseline` reached `self`?
  pub fn contains_all_of(&self, baseline: &PatchIdentitySet) -> bool {
    baseline.fingerprints.is_subset(&self.fingerprints)
      && baseline.unresolved.iter().all(|id| self.commit_ids.contains(id))
  }
}

pub struct Comparator<'a> {
  source: &'a dyn CommitSource,
  memo: Mutex<HashMap<String, Identity>>,
}

impl<'a> Comparator<'a> {
  pub fn new(source: &'a dyn CommitSource) -> Self {
    Self {
      source,
      memo: Mutex::new(HashMap::new()),
    }
  }

  fn identity(&self, commit: &CommitSummary) -> Result<Identity, FetchError> {
    if commit.is_merge() {
      return Ok(Identity::Excluded);
    }
    if let Some(hit) = self.memo.lock().ok().and_then(|m| m.get(&commit.sha).cloned()) {
      return Ok(hit);
    }

    let identity = match self.source.diff(&commit.sha).and_then(|d| fingerprint(&d)) {
      Ok(Some(fp)) => Identity::Fingerprint(fp),
      Ok(None) => Identity::Excluded,
      Err(e) if e.is_auth() => return Err(e),
      Err(e) => {
        debug!(sha = %commit.sha, error = %e, "commit left unresolved");
        Identity::Unresolved
      }
    };

    if let Ok(mut m) = self.memo.lock() {
      m.insert(commit.sha.clone(), identity.clone());
    }
    Ok(identity)
  }

  /// Patch identities of every commit reachable from `reference`.
  pub fn identity_set(&self, reference: &str) -> Result<PatchIdentitySet, FetchError> {
    let commits = self.source.commits(reference, None)?;
    let identities = commits
      .par_iter()
      .map(|c| self.identity(c))
      .collect::<Result<Vec<_>, _>>()?;

    let mut set = PatchIdentitySet {
      commits: commits.len(),
      ..Default::default()
    };
    for (commit, identity) in commits.iter().zip(identities) {
      set.commit_ids.insert(commit.sha.clone());
      match identity {
        Identity::Fingerprint(fp) => {
          set.fingerprints.insert(fp);
        }
        Identity::Unresolved => {
          set.unresolved.insert(commit.sha.clone());
        }
        Identity::Excluded => {}
      }
    }
    Ok(set)
  }
}

/// Verdict row for `branch` against an already computed baseline set.
pub fn verdict(
  repo: &RepositoryRef,
  branch: &str,
  baseline: &PatchIdentitySet,
  candidate: &PatchIdentitySet,
) -> SyncVerdict {
  let unresolved: BTreeSet<String> = baseline
    .unresolved
    .iter()
    .chain(candidate.unresolved.iter())
    .map(|id| short_sha(id))
    .collect();

  SyncVerdict {
    repository: repo.clone(),
    branch: branch.to_string(),
    synced: candidate.contains_all_of(baseline),
    baseline_commits: baseline.commits,
    branch_commits: candidate.commits,
    unresolved: unresolved.into_iter().collect(),
  }
}

/// Commit-prefix fallback: synced when any baseline commit from the window is among the branch's newest commits.
pub fn prefix_verdict(
  source: &dyn CommitSource,
  repo: &RepositoryRef,
  baseline: &str,
  branch: &str,
  window: &TimeWindow,
) -> Result<SyncVerdict, FetchError> {
  // `since` is inclusive on both sources; the window is not.
  let recent: Vec<CommitSummary> = source
    .commits(baseline, Some(window.cutoff))?
    .into_iter()
    .filter(|c| c.committed_at.map_or(true, |t| window.contains(t)))
    .collect();
  let prefixes: HashSet<String> = recent.iter().map(|c| c.sha.chars().take(PREFIX_LEN).collect()).collect();
  let head = source.head_commits(branch, PREFIX_SCAN_DEPTH)?;

  let synced = head
    .iter()
    .any(|c| prefixes.contains(&c.sha.chars().take(PREFIX_LEN).collect::<String>()));

  warn!(repo = %repo, branch, "sync decided by commit-prefix fallback (lower fidelity)");

  Ok(SyncVerdict {
    repository: repo.clone(),
    branch: branch.to_string(),
    synced,
    baseline_commits: recent.len(),
    branch_commits: head.len(),
    unresolved: Vec::new(),
  })
}
