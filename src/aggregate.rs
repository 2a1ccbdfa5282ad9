// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Fold per-repository, per-branch outcomes into one stable, grouped report
// role: aggregate/report
// inputs: Configured repository order; RepoOutcome per finished repository; window, kind, baseline
// outputs: Report<R> with exactly one entry and one status per configured repository
// invariants:
// - Entries follow configured order (configured list de-duplicated first-seen), never discovery/completion order
// - Groups sorted lexically by name; rows sorted by timestamp descending; duplicate identities dropped
// - NotFound / FetchError on a pair is never downgraded by the "no records" default
// - A repository with no outcome is Aborted with no rows; one with no branches is NoApplicableBranches
// - A discovery failure (even a 404 on the repository or CI folder) is FetchError, never NotFound
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::model::{BranchGroup, Record, Report, ReportEntry, ReportKind, RepositoryRef, SkippedRecord};
use crate::status::{BranchStatus, RepoStatus, StatusBook};
use crate::window::TimeWindow;

/// What happened for one (repository, branch) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchOutcome<R> {
  pub name: String,
  /// Error recorded while fetching, if any.
  pub error: Option<FetchError>,
  pub rows: Vec<R>,
}

impl<R> BranchOutcome<R> {
  pub fn rows(name: impl Into<String>, rows: Vec<R>) -> Self {
    Self {
      name: name.into(),
      error: None,
      rows,
    }
  }

  pub fn failed(name: impl Into<String>, error: FetchError) -> Self {
    Self {
      name: name.into(),
      error: Some(error),
      rows: Vec::new(),
    }
  }
}

/// Everything one repository produced before the run finished.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoOutcome<R> {
  pub repository: RepositoryRef,
  pub discovery_error: Option<FetchError>,
  pub branches: Vec<BranchOutcome<R>>,
  pub skipped: Vec<SkippedRecord>,
}

impl<R> RepoOutcome<R> {
  pub fn new(repository: RepositoryRef) -> Self {
    Self {
      repository,
      discovery_error: None,
      branches: Vec::new(),
      skipped: Vec::new(),
    }
  }
}

/// Configured repositories with duplicates removed, first occurrence wins.
pub fn dedupe_repositories(configured: &[RepositoryRef]) -> Vec<RepositoryRef> {
  let mut seen = HashSet::new();
  configured.iter().filter(|r| seen.insert((*r).clone())).cloned().collect()
}

fn sort_and_dedupe<R: Record>(rows: Vec<R>) -> Vec<R> {
  let mut seen: HashSet<String> = HashSet::new();
  let mut rows: Vec<R> = rows.into_iter().filter(|r| seen.insert(r.identity().to_string())).collect();
  rows.sort_by_key(|r| std::cmp::Reverse(r.timestamp()));
  rows
}

fn entry_for<R: Record>(outcome: RepoOutcome<R>) -> (ReportEntry<R>, Vec<SkippedRecord>) {
  let mut book = StatusBook::new();
  let mut merged: BTreeMap<String, Vec<R>> = BTreeMap::new();

  for b in outcome.branches {
    if let Some(e) = &b.error {
      book.record(&b.name, BranchStatus::from_fetch_error(e));
    }
    if !b.rows.is_empty() {
      book.record(&b.name, BranchStatus::FoundWithRecords);
    }
    merged.entry(b.name).or_default().extend(b.rows);
  }

  let mut groups = Vec::with_capacity(merged.len());
  for (name, rows) in merged {
    book.default_no_records(&name);
    let rows = sort_and_dedupe(rows);
    let status = book
      .get(&name)
      .cloned()
      .unwrap_or(BranchStatus::FoundNoRecordsInWindow);
    groups.push(BranchGroup { name, status, rows });
  }

  let status = match &outcome.discovery_error {
    Some(e) if groups.is_empty() => RepoStatus::FetchError(e.to_string()),
    _ => RepoStatus::summarize(groups.iter().map(|g| &g.status)),
  };

  let entry = ReportEntry {
    repository: outcome.repository,
    status,
    groups,
  };
  (entry, outcome.skipped)
}

pub struct ReportContext {
  pub kind: ReportKind,
  pub generated_at: DateTime<Utc>,
  pub window: TimeWindow,
  pub baseline: String,
}

/// Build the final report over the configured repository list.
pub fn build_report<R: Record>(
  ctx: ReportContext,
  configured: &[RepositoryRef],
  mut outcomes: HashMap<RepositoryRef, RepoOutcome<R>>,
  warnings: Vec<String>,
) -> Report<R> {
  let mut entries = Vec::new();
  let mut statuses = BTreeMap::new();
  let mut skipped = Vec::new();

  for repo in dedupe_repositories(configured) {
    let entry = match outcomes.remove(&repo) {
      Some(outcome) => {
        let (entry, mut dropped) = entry_for(outcome);
        skipped.append(&mut dropped);
        entry
      }
      None => ReportEntry {
        repository: repo.clone(),
        status: RepoStatus::Aborted,
        groups: Vec::new(),
      },
    };
    statuses.insert(repo.to_string(), entry.status.clone());
    entries.push(entry);
  }

  Report {
    kind: ctx.kind,
    generated_at: ctx.generated_at,
    window: ctx.window,
    baseline: ctx.baseline,
    entries,
    statuses,
    skipped,
    warnings,
  }
}
