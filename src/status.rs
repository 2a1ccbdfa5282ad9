// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Closed status enums for (repository, branch) pairs and repositories, with precedence-preserving bookkeeping
// role: model/status
// outputs: BranchStatus, RepoStatus, StatusBook
// invariants:
// - Precedence FetchError > NotFound > FoundWithRecords > FoundNoRecordsInWindow
// - Recording a weaker status never replaces a stronger one for the same pair
// - Labels are stable identifiers shared by JSON tags, CSS classes and logs; display text lives in render
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum BranchStatus {
  #[serde(rename = "populated")]
  FoundWithRecords,
  #[serde(rename = "no-data-in-window")]
  FoundNoRecordsInWindow,
  #[serde(rename = "branch-not-found")]
  NotFound,
  #[serde(rename = "fetch-failed")]
  FetchError(String),
}

impl BranchStatus {
  fn rank(&self) -> u8 {
    match self {
      BranchStatus::FoundNoRecordsInWindow => 0,
      BranchStatus::FoundWithRecords => 1,
      BranchStatus::NotFound => 2,
      BranchStatus::FetchError(_) => 3,
    }
  }

  /// Keep whichever of the two statuses is more informative; ties keep `self`.
  pub fn merge(self, other: BranchStatus) -> BranchStatus {
    if other.rank() > self.rank() {
      other
    } else {
      self
    }
  }

  pub fn from_fetch_error(err: &FetchError) -> BranchStatus {
    match err {
      FetchError::NotFound => BranchStatus::NotFound,
      other => BranchStatus::FetchError(other.to_string()),
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      BranchStatus::FoundWithRecords => "populated",
      BranchStatus::FoundNoRecordsInWindow => "no-data-in-window",
      BranchStatus::NotFound => "branch-not-found",
      BranchStatus::FetchError(_) => "fetch-failed",
    }
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, BranchStatus::NotFound | BranchStatus::FetchError(_))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum RepoStatus {
  Populated,
  #[serde(rename = "no-data-in-window")]
  NoRecordsInWindow,
  #[serde(rename = "branch-not-found")]
  NotFound,
  #[serde(rename = "fetch-failed")]
  FetchError(String),
  NoApplicableBranches,
  Aborted,
}

impl RepoStatus {
  pub fn label(&self) -> &'static str {
    match self {
      RepoStatus::Populated => "populated",
      RepoStatus::NoRecordsInWindow => "no-data-in-window",
      RepoStatus::NotFound => "branch-not-found",
      RepoStatus::FetchError(_) => "fetch-failed",
      RepoStatus::NoApplicableBranches => "no-applicable-branches",
      RepoStatus::Aborted => "aborted",
    }
  }

  /// Summarize branch statuses: any data wins, then the strongest failure, then "no data".
  pub fn summarize<'a, I>(statuses: I) -> RepoStatus
  where
    I: IntoIterator<Item = &'a BranchStatus>,
  {
    let mut any = false;
    let mut populated = false;
    let mut strongest: Option<BranchStatus> = None;

    for s in statuses {
      any = true;
      match s {
        BranchStatus::FoundWithRecords => populated = true,
        BranchStatus::FoundNoRecordsInWindow => {}
        failure => {
          strongest = Some(match strongest {
            Some(cur) => cur.merge(failure.clone()),
            None => failure.clone(),
          })
        }
      }
    }

    if !any {
      return RepoStatus::NoApplicableBranches;
    }
    if populated {
      return RepoStatus::Populated;
    }

    match strongest {
      Some(BranchStatus::NotFound) => RepoStatus::NotFound,
      Some(BranchStatus::FetchError(detail)) => RepoStatus::FetchError(detail),
      _ => RepoStatus::NoRecordsInWindow,
    }
  }
}

/// Per-run status ledger keyed by branch name within one repository.
#[derive(Debug, Default, Clone)]
pub struct StatusBook {
  entries: BTreeMap<String, BranchStatus>,
}

impl StatusBook {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&mut self, branch: &str, status: BranchStatus) {
    match self.entries.remove(branch) {
      Some(cur) => self.entries.insert(branch.to_string(), cur.merge(status)),
      None => self.entries.insert(branch.to_string(), status),
    };
  }

  /// Fill the "no records" default for a branch that has nothing recorded yet.
  pub fn default_no_records(&mut self, branch: &str) {
    self.record(branch, BranchStatus::FoundNoRecordsInWindow);
  }

  pub fn get(&self, branch: &str) -> Option<&BranchStatus> {
    self.entries.get(branch)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &BranchStatus)> {
    self.entries.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn errors_are_never_downgraded_to_no_records() {
    let mut book = StatusBook::new();
    book.record("main", BranchStatus::NotFound);
    book.default_no_records("main");
    assert_eq!(book.get("main"), Some(&BranchStatus::NotFound));

    book.record("dev", BranchStatus::FetchError("HTTP 502".into()));
    book.default_no_records("dev");
    book.record("dev", BranchStatus::FoundWithRecords);
    assert_eq!(book.get("dev"), Some(&BranchStatus::FetchError("HTTP 502".into())));
  }

  #[test]
  fn records_are_not_overwritten_by_weaker_default() {
    let mut book = StatusBook::new();
    book.record("release/1.0", BranchStatus::FoundWithRecords);
    book.default_no_records("release/1.0");
    assert_eq!(book.get("release/1.0"), Some(&BranchStatus::FoundWithRecords));
  }

  #[test]
  fn summarize_prefers_data_then_failures() {
    let with_data = [BranchStatus::NotFound, BranchStatus::FoundWithRecords];
    assert_eq!(RepoStatus::summarize(&with_data), RepoStatus::Populated);

    let failures = [BranchStatus::FoundNoRecordsInWindow, BranchStatus::NotFound];
    assert_eq!(RepoStatus::summarize(&failures), RepoStatus::NotFound);

    let mixed = [BranchStatus::NotFound, BranchStatus::FetchError("boom".into())];
    assert_eq!(RepoStatus::summarize(&mixed), RepoStatus::FetchError("boom".into()));

    let quiet = [BranchStatus::FoundNoRecordsInWindow];
    assert_eq!(RepoStatus::summarize(&quiet), RepoStatus::NoRecordsInWindow);

    assert_eq!(RepoStatus::summarize(&Vec::<BranchStatus>::new()), RepoStatus::NoApplicableBranches);
  }

  #[test]
  fn labels_are_distinct() {
    let labels = [
      RepoStatus::Populated.label(),
      RepoStatus::NoRecordsInWindow.label(),
      RepoStatus::NotFound.label(),
      RepoStatus::FetchError(String::new()).label(),
      RepoStatus::NoApplicableBranches.label(),
      RepoStatus::Aborted.label(),
    ];
    let unique: std::collections::BTreeSet<_> = labels.iter().collect();
    assert_eq!(unique.len(), labels.len());
  }

  #[test]
  fn json_tags_match_labels() {
    let v = serde_json::to_value(BranchStatus::FetchError("HTTP 500".into())).unwrap();
    assert_eq!(v["status"], "fetch-failed");
    assert_eq!(v["detail"], "HTTP 500");

    let branches = [
      BranchStatus::FoundWithRecords,
      BranchStatus::FoundNoRecordsInWindow,
      BranchStatus::NotFound,
      BranchStatus::FetchError("x".into()),
    ];
    for s in branches {
      assert_eq!(serde_json::to_value(&s).unwrap()["status"], s.label());
      let back: BranchStatus = serde_json::from_value(serde_json::to_value(&s).unwrap()).unwrap();
      assert_eq!(back, s);
    }

    let repos = [
      RepoStatus::Populated,
      RepoStatus::NoRecordsInWindow,
      RepoStatus::NotFound,
      RepoStatus::FetchError("x".into()),
      RepoStatus::NoApplicableBranches,
      RepoStatus::Aborted,
    ];
    for s in repos {
      assert_eq!(serde_json::to_value(&s).unwrap()["status"], s.label());
    }
  }
}
