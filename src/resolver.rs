// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Turn a repository's branch specs into an ordered, de-duplicated set of concrete branch/tag names
// role: resolver/branches
// inputs: BranchSpec list; TimeWindow; BranchLister (GitHub branches, Jenkins jobs, or a local mirror); optional TagLister
// outputs: Resolution { names, error }
// invariants:
// - Literal names pass through unchecked; existence is verified by the fetch step
// - `prefix/*` keeps listed names starting with `prefix/`; re-filtering by the same prefix is idempotent
// - `dynamic` = release/* expansion ∪ allow-listed tags committed strictly inside the window
// - Any discovery failure yields an empty set plus the error (never NotFound)
// - Listings go through the shared DiscoveryCache
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::DiscoveryCache;
use crate::error::FetchError;
use crate::model::{BranchSpec, RepositoryRef};
use crate::sources::github::{GithubClient, TagRef};
use crate::sources::gitmirror::GitMirror;
use crate::sources::jenkins::JenkinsClient;
use crate::window::TimeWindow;

pub const RELEASE_PREFIX: &str = "release/";

pub trait BranchLister: Send + Sync {
  fn branch_names(&self) -> Result<Arc<Vec<String>>, FetchError>;
}

pub trait TagLister: Send + Sync {
  fn tags(&self) -> Result<Arc<Vec<TagRef>>, FetchError>;
  fn tag_date(&self, tag: &TagRef) -> Result<chrono::DateTime<chrono::Utc>, FetchError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
  pub names: Vec<String>,
  pub error: Option<FetchError>,
}

pub struct Resolver<'a> {
  pub branches: &'a dyn BranchLister,
  pub tags: Option<&'a dyn TagLister>,
  pub tag_prefixes: &'a [String],
}

/// Names from `names` that start with `prefix` (which ends in `/`), in listing order.
pub fn expand_pattern(names: &[String], prefix: &str) -> Vec<String> {
  names.iter().filter(|n| n.starts_with(prefix)).cloned().collect()
}

fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, name: String) {
  if seen.insert(name.clone()) {
    out.push(name);
  }
}

impl Resolver<'_> {
  pub fn resolve(&self, specs: &[BranchSpec], window: &TimeWindow) -> Resolution {
    match self.try_resolve(specs, window) {
      Ok(names) => Resolution { names, error: None },
      Err(e) => Resolution {
        names: Vec::new(),
        error: Some(e),
      },
    }
  }

  fn try_resolve(&self, specs: &[BranchSpec], window: &TimeWindow) -> Result<Vec<String>, FetchError> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for spec in specs {
      match spec {
        BranchSpec::Literal(name) => push_unique(&mut out, &mut seen, name.clone()),
        BranchSpec::Pattern(prefix) => {
          for n in expand_pattern(&self.branches.branch_names()?, prefix) {
            push_unique(&mut out, &mut seen, n);
          }
        }
        BranchSpec::Dynamic => {
          for n in expand_pattern(&self.branches.branch_names()?, RELEASE_PREFIX) {
            push_unique(&mut out, &mut seen, n);
          }
          for n in self.windowed_tags(window)? {
            push_unique(&mut out, &mut seen, n);
          }
        }
      }
    }
    Ok(out)
  }

  fn windowed_tags(&self, window: &TimeWindow) -> Result<Vec<String>, FetchError> {
    let Some(lister) = self.tags else {
      return Ok(Vec::new());
    };

    let mut names = Vec::new();
    for tag in lister.tags()?.iter() {
      if !self.tag_prefixes.iter().any(|p| tag.name.starts_with(p.as_str())) {
        continue;
      }
      match lister.tag_date(tag) {
        Ok(ts) if window.contains(ts) => names.push(tag.name.clone()),
        Ok(_) => debug!(tag = %tag.name, "tag outside window"),
        Err(FetchError::Data(detail)) => warn!(tag = %tag.name, %detail, "tag date unreadable; skipped"),
        Err(e) => return Err(e),
      }
    }
    Ok(names)
  }
}

// --- Listers ---

pub struct GithubBranches {
  pub client: Arc<GithubClient>,
  pub repo: RepositoryRef,
  pub cache: Arc<DiscoveryCache<Vec<String>>>,
}

impl BranchLister for GithubBranches {
  fn branch_names(&self) -> Result<Arc<Vec<String>>, FetchError> {
    self
      .cache
      .get_or_refresh(&format!("branches:{}", self.repo), || self.client.branches(&self.repo))
  }
}

pub struct JenkinsJobs {
  pub client: Arc<JenkinsClient>,
  pub ci_path: String,
  pub repo: RepositoryRef,
  pub cache: Arc<DiscoveryCache<Vec<String>>>,
}

impl BranchLister for JenkinsJobs {
  fn branch_names(&self) -> Result<Arc<Vec<String>>, FetchError> {
    let key = format!("jobs:{}/job/{}", self.ci_path, self.repo.name);
    self
      .cache
      .get_or_refresh(&key, || self.client.child_jobs(&self.ci_path, &self.repo))
  }
}

pub struct MirrorBranches<'a> {
  pub mirror: &'a GitMirror,
}

impl BranchLister for MirrorBranches<'_> {
  fn branch_names(&self) -> Result<Arc<Vec<String>>, FetchError> {
    self.mirror.branches().map(Arc::new)
  }
}

pub struct GithubTags {
  pub client: Arc<GithubClient>,
  pub repo: RepositoryRef,
  pub cache: Arc<DiscoveryCache<Vec<TagRef>>>,
}

impl TagLister for GithubTags {
  fn tags(&self) -> Result<Arc<Vec<TagRef>>, FetchError> {
    self
      .cache
      .get_or_refresh(&format!("tags:{}", self.repo), || self.client.tags(&self.repo))
  }

  fn tag_date(&self, tag: &TagRef) -> Result<chrono::DateTime<chrono::Utc>, FetchError> {
    self.client.commit_date(&self.repo, &tag.sha)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::window::parse_utc;
  use chrono::{DateTime, Duration, Utc};
  use proptest::prelude::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct StaticBranches {
    names: Result<Vec<String>, FetchError>,
    calls: AtomicUsize,
  }

  impl StaticBranches {
    fn ok(names: &[&str]) -> Self {
      Self {
        names: Ok(names.iter().map(|s| s.to_string()).collect()),
        calls: AtomicUsize::new(0),
      }
    }
  }

  impl BranchLister for StaticBranches {
    fn branch_names(&self) -> Result<Arc<Vec<String>>, FetchError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.names.clone().map(Arc::new)
    }
  }

  struct StaticTags {
    dated: HashMap<String, Result<DateTime<Utc>, FetchError>>,
  }

  impl TagLister for StaticTags {
    fn tags(&self) -> Result<Arc<Vec<TagRef>>, FetchError> {
      let mut names: Vec<&String> = self.dated.keys().collect();
      names.sort();
      Ok(Arc::new(
        names
          .into_iter()
          .map(|n| TagRef {
            name: n.clone(),
            sha: format!("sha-{}", n),
          })
          .collect(),
      ))
    }

    fn tag_date(&self, tag: &TagRef) -> Result<DateTime<Utc>, FetchError> {
      self.dated[&tag.name].clone()
    }
  }

  fn now() -> DateTime<Utc> {
    parse_utc("2025-08-15T12:00:00Z").unwrap()
  }

  fn specs(raw: &[&str]) -> Vec<BranchSpec> {
    raw.iter().map(|s| s.parse().unwrap()).collect()
  }

  fn prefixes() -> Vec<String> {
    vec!["v1".into(), "v2".into()]
  }

  #[test]
  fn literal_and_pattern_dedupe_first_seen() {
    let lister = StaticBranches::ok(&["main", "release/2.0", "develop", "release/1.0"]);
    let p = prefixes();
    let r = Resolver {
      branches: &lister,
      tags: None,
      tag_prefixes: &p,
    };

    let got = r.resolve(&specs(&["release/1.0", "main", "release/*", "main"]), &TimeWindow::new(now(), 7));
    assert_eq!(got.error, None);
    assert_eq!(got.names, vec!["release/1.0", "main", "release/2.0"]);
  }

  #[test]
  fn literals_are_not_checked() {
    let lister = StaticBranches::ok(&[]);
    let p = prefixes();
    let r = Resolver {
      branches: &lister,
      tags: None,
      tag_prefixes: &p,
    };
    let got = r.resolve(&specs(&["does-not-exist"]), &TimeWindow::new(now(), 7));
    assert_eq!(got.names, vec!["does-not-exist"]);
    assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn dynamic_unions_release_branches_and_windowed_tags() {
    let window = TimeWindow::new(now(), 7);
    let lister = StaticBranches::ok(&["main", "release/3.1", "hotfix/x"]);
    let tags = StaticTags {
      dated: HashMap::from([
        ("v1.4.0".to_string(), Ok(now() - Duration::days(1))),
        ("v2.0.0".to_string(), Ok(window.cutoff)),
        ("v3.0.0".to_string(), Ok(now())),
        ("v2.1.0".to_string(), Err(FetchError::Data("no date".into()))),
      ]),
    };
    let p = prefixes();
    let r = Resolver {
      branches: &lister,
      tags: Some(&tags),
      tag_prefixes: &p,
    };

    let got = r.resolve(&specs(&["dynamic"]), &window);
    assert_eq!(got.error, None);
    assert_eq!(got.names, vec!["release/3.1", "v1.4.0"]);
  }

  #[test]
  fn discovery_failure_is_a_fetch_error_with_no_names() {
    let lister = StaticBranches {
      names: Err(FetchError::from_status(503, "down")),
      calls: AtomicUsize::new(0),
    };
    let p = prefixes();
    let r = Resolver {
      branches: &lister,
      tags: None,
      tag_prefixes: &p,
    };

    let got = r.resolve(&specs(&["main", "develop/*"]), &TimeWindow::new(now(), 7));
    assert!(got.names.is_empty());
    assert!(matches!(got.error, Some(FetchError::Transient { status: Some(503), .. })));
  }

  #[test]
  fn tag_date_transient_failure_fails_discovery() {
    let lister = StaticBranches::ok(&[]);
    let tags = StaticTags {
      dated: HashMap::from([("v1.0".to_string(), Err(FetchError::network("timeout")))]),
    };
    let p = prefixes();
    let r = Resolver {
      branches: &lister,
      tags: Some(&tags),
      tag_prefixes: &p,
    };
    let got = r.resolve(&specs(&["dynamic"]), &TimeWindow::new(now(), 7));
    assert!(got.names.is_empty());
    assert!(got.error.unwrap().is_transient());
  }

  proptest! {
    #[test]
    fn pattern_expansion_is_idempotent(
      names in proptest::collection::vec("(release|develop|feature)/[a-z0-9]{1,4}|main|v[12]\\.[0-9]", 0..20),
      prefix in "(release|develop|feature)/",
    ) {
      let once = expand_pattern(&names, &prefix);
      let twice = expand_pattern(&once, &prefix);
      prop_assert_eq!(once, twice);
    }
  }
}
