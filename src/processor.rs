// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Run one digest request end to end: select repositories, fan out on a worker pool, fold outcomes into a Report
// role: processing/orchestrator
// inputs: DigestConfig; DigestRequest (selection, baseline, days, branch override); injected now; Sources; EngineOptions
// outputs: Report<PullRequestRecord | BuildRecord | SyncVerdict> or OrgListing
// side_effects: Network or git calls through the sources; spawns the deadline thread when a run limit is set
// invariants:
// - Repositories run in parallel on a pool of `concurrency` threads; results are keyed, never ordered by completion
// - The cancel token is checked before a repository starts and after it finishes; unfinished work is Aborted
// - An Auth failure anywhere trips the token and fails the run with no report
// - Only Transient failures are retried, at most `retries` times per call
// errors: RunError::Auth, RunError::Config (selection or missing CI), RunError::Pool
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::{build_report, BranchOutcome, RepoOutcome, ReportContext};
use crate::cache::{Clock, DiscoveryCache};
use crate::compare::{prefix_verdict, verdict, Comparator, SyncMethod};
use crate::config::{DigestConfig, RepositoryConfig};
use crate::error::{ConfigError, FetchError, RunError};
use crate::model::{
  BranchSpec, BuildRecord, OrgListing, PullRequestRecord, Record, Report, ReportKind, RepositoryListing,
  RepositoryRef, SkippedRecord, SyncVerdict,
};
use crate::resolver::{BranchLister, GithubBranches, GithubTags, JenkinsJobs, MirrorBranches, Resolver, TagLister};
use crate::sources::github::{GithubClient, GithubCommits, TagRef};
use crate::sources::gitmirror::GitMirror;
use crate::sources::jenkins::JenkinsClient;
use crate::sources::{CommitSource, Fetched};
use crate::util::short_sha;
use crate::window::TimeWindow;

/// Which repositories a request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
  Defaults,
  /// `name` or `owner/name` entries, resolved against the configuration.
  Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestRequest {
  pub selection: Selection,
  pub baseline: String,
  pub days: u32,
  /// Replaces each repository's configured branch specs (builds) or candidate specs (sync).
  pub branches: Option<Vec<BranchSpec>>,
}

impl DigestRequest {
  pub fn new(selection: Selection, baseline: &str, days: u32) -> Result<Self, ConfigError> {
    let baseline = baseline.trim();
    if baseline.is_empty() {
      return Err(ConfigError::Invalid("baseline branch must not be empty".into()));
    }
    if days == 0 {
      return Err(ConfigError::Invalid("days must be a positive integer".into()));
    }
    Ok(Self {
      selection,
      baseline: baseline.to_string(),
      days,
      branches: None,
    })
  }

  pub fn with_branches(mut self, branches: Vec<BranchSpec>) -> Self {
    if !branches.is_empty() {
      self.branches = Some(branches);
    }
    self
  }
}

/// Shared flag that stops new repositories from starting and discards unfinished ones.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// Trip the token once `limit` has elapsed.
  pub fn cancel_after(&self, limit: Duration) {
    let token = self.clone();
    std::thread::spawn(move || {
      std::thread::sleep(limit);
      if !token.is_cancelled() {
        warn!(limit_secs = limit.as_secs(), "run deadline reached; cancelling");
      }
      token.cancel();
    });
  }
}

/// Remote collaborators for one run.
pub struct Sources {
  pub github: Arc<GithubClient>,
  pub jenkins: Option<Arc<JenkinsClient>>,
}

pub struct EngineOptions {
  pub concurrency: usize,
  pub retries: u32,
  pub sync_method: SyncMethod,
  pub clock: Arc<dyn Clock>,
  pub cancel: CancelToken,
}

enum Finished<R> {
  Done(RepoOutcome<R>),
  Aborted,
  Auth(FetchError),
}

pub struct Engine<'a> {
  cfg: &'a DigestConfig,
  sources: Sources,
  branch_cache: Arc<DiscoveryCache<Vec<String>>>,
  tag_cache: Arc<DiscoveryCache<Vec<TagRef>>>,
  listing_cache: DiscoveryCache<Fetched<RepositoryListing>>,
  pool: rayon::ThreadPool,
  retries: u32,
  sync_method: SyncMethod,
  cancel: CancelToken,
}

fn auth_error<R>(outcome: &RepoOutcome<R>) -> Option<FetchError> {
  outcome
    .discovery_error
    .iter()
    .chain(outcome.branches.iter().filter_map(|b| b.error.as_ref()))
    .find(|e| e.is_auth())
    .cloned()
}

fn skipped_records(repo: &RepositoryRef, branch: &str, reasons: Vec<String>) -> Vec<SkippedRecord> {
  reasons
    .into_iter()
    .map(|reason| {
      warn!(repo = %repo, branch, %reason, "record skipped");
      SkippedRecord {
        repository: repo.clone(),
        branch: branch.to_string(),
        reason,
      }
    })
    .collect()
}

impl<'a> Engine<'a> {
  pub fn new(cfg: &'a DigestConfig, sources: Sources, opts: EngineOptions) -> Result<Self, RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(opts.concurrency.max(1))
      .thread_name(|i| format!("digest-worker-{}", i))
      .build()?;
    let refresh = chrono::Duration::seconds(cfg.cache_refresh_secs as i64);

    Ok(Self {
      cfg,
      sources,
      branch_cache: Arc::new(DiscoveryCache::new(Arc::clone(&opts.clock), refresh)),
      tag_cache: Arc::new(DiscoveryCache::new(Arc::clone(&opts.clock), refresh)),
      listing_cache: DiscoveryCache::new(opts.clock, refresh),
      pool,
      retries: opts.retries,
      sync_method: opts.sync_method,
      cancel: opts.cancel,
    })
  }

  /// Invoke `call`, retrying Transient failures with a short doubling pause.
  fn attempt<T>(&self, what: &str, call: impl Fn() -> Result<T, FetchError>) -> Result<T, FetchError> {
    let mut tries = 0u32;
    loop {
      match call() {
        Err(e) if e.is_transient() && tries < self.retries => {
          tries += 1;
          let pause = Duration::from_millis(200u64 << (tries - 1).min(5));
          warn!(what, attempt = tries, error = %e, "transient failure; retrying");
          std::thread::sleep(pause);
        }
        other => return other,
      }
    }
  }

  fn selected(&self, selection: &Selection) -> Result<Vec<RepositoryRef>, ConfigError> {
    match selection {
      Selection::Defaults => Ok(self.cfg.repository_refs()),
      Selection::Named(names) => names.iter().map(|n| self.cfg.select(n)).collect(),
    }
  }

  fn repo_config(&self, repo: &RepositoryRef) -> Result<&'a RepositoryConfig, ConfigError> {
    self
      .cfg
      .find_repository(repo)
      .ok_or_else(|| ConfigError::Invalid(format!("repository `{}` is not configured", repo)))
  }

  /// Fan `per_repo` out over the selected repositories and fold the results.
  fn run<R, F>(&self, kind: ReportKind, req: &DigestRequest, now: DateTime<Utc>, per_repo: F) -> Result<Report<R>, RunError>
  where
    R: Record + Send,
    F: Fn(&RepositoryRef, &TimeWindow) -> Result<RepoOutcome<R>, FetchError> + Sync,
  {
    let repos = self.selected(&req.selection)?;
    let window = TimeWindow::new(now, req.days);
    info!(kind = ?kind, repos = repos.len(), window = %window.label(), "starting run");

    let finished: Vec<(RepositoryRef, Finished<R>)> = self.pool.install(|| {
      repos
        .par_iter()
        .map(|repo| {
          if self.cancel.is_cancelled() {
            return (repo.clone(), Finished::Aborted);
          }
          debug!(repo = %repo, "repository started");

          let result = per_repo(repo, &window).and_then(|outcome| match auth_error(&outcome) {
            Some(e) => Err(e),
            None => Ok(outcome),
          });

          let state = match result {
            Err(e) if e.is_auth() => {
              self.cancel.cancel();
              Finished::Auth(e)
            }
            Err(e) => {
              let mut outcome = RepoOutcome::new(repo.clone());
              outcome.discovery_error = Some(e);
              Finished::Done(outcome)
            }
            Ok(_) if self.cancel.is_cancelled() => Finished::Aborted,
            Ok(outcome) => Finished::Done(outcome),
          };
          (repo.clone(), state)
        })
        .collect()
    });

    let mut outcomes = HashMap::new();
    let mut aborted = 0usize;
    for (repo, state) in finished {
      match state {
        Finished::Auth(source) => {
          return Err(RunError::Auth {
            repo: repo.to_string(),
            source,
          })
        }
        Finished::Aborted => aborted += 1,
        Finished::Done(outcome) => {
          outcomes.insert(repo, outcome);
        }
      }
    }

    let mut warnings = Vec::new();
    if aborted > 0 {
      warnings.push(format!("run cancelled; {} repositories did not finish", aborted));
    }
    if kind == ReportKind::Sync && self.sync_method == SyncMethod::Prefix {
      warnings.push("sync verdicts use the commit-prefix fallback".into());
    }

    let ctx = ReportContext {
      kind,
      generated_at: now,
      window,
      baseline: req.baseline.clone(),
    };
    Ok(build_report(ctx, &repos, outcomes, warnings))
  }

  /// Merged pull requests into the baseline branch.
  pub fn pull_requests(&self, req: &DigestRequest, now: DateTime<Utc>) -> Result<Report<PullRequestRecord>, RunError> {
    let gh = &self.sources.github;
    let baseline = req.baseline.as_str();

    self.run(ReportKind::Prs, req, now, |repo, window| {
      let mut out = RepoOutcome::new(repo.clone());

      if let Err(e) = self.attempt("branch", || gh.branch_tip(repo, baseline)) {
        debug!(repo = %repo, branch = baseline, error = %e, "baseline branch unavailable");
        out.branches.push(BranchOutcome::failed(baseline, e));
        return Ok(out);
      }

      match self.attempt("pulls", || gh.merged_pulls(repo, baseline, window)) {
        Ok(fetched) => {
          out.skipped = skipped_records(repo, baseline, fetched.skipped);
          out.branches.push(BranchOutcome::rows(baseline, fetched.rows));
        }
        Err(e) => out.branches.push(BranchOutcome::failed(baseline, e)),
      }
      Ok(out)
    })
  }

  /// CI builds per resolved branch or tag job.
  pub fn builds(&self, req: &DigestRequest, now: DateTime<Utc>) -> Result<Report<BuildRecord>, RunError> {
    let Some(jenkins) = self.sources.jenkins.as_ref() else {
      return Err(ConfigError::Invalid("the builds report needs a [ci] url".into()).into());
    };

    self.run(ReportKind::Builds, req, now, |repo, window| {
      let rc = self.repo_config(repo).map_err(|e| FetchError::Data(e.to_string()))?;
      let specs = req.branches.as_deref().unwrap_or(&rc.branches);
      let mut out = RepoOutcome::new(repo.clone());

      let jobs = JenkinsJobs {
        client: Arc::clone(jenkins),
        ci_path: rc.ci_path.clone(),
        repo: repo.clone(),
        cache: Arc::clone(&self.branch_cache),
      };
      let tags = GithubTags {
        client: Arc::clone(&self.sources.github),
        repo: repo.clone(),
        cache: Arc::clone(&self.tag_cache),
      };
      let wants_tags = specs.iter().any(|s| *s == BranchSpec::Dynamic);

      let resolution = Resolver {
        branches: &jobs,
        tags: wants_tags.then_some(&tags as &dyn TagLister),
        tag_prefixes: &self.cfg.tag_prefixes,
      }
      .resolve(specs, window);

      if let Some(e) = resolution.error {
        out.discovery_error = Some(e);
        return Ok(out);
      }

      let fetched: Vec<(BranchOutcome<BuildRecord>, Vec<SkippedRecord>)> = resolution
        .names
        .par_iter()
        .map(|name| match self.attempt("builds", || jenkins.builds(&rc.ci_path, repo, name, window)) {
          Ok(f) => (BranchOutcome::rows(name.as_str(), f.rows), skipped_records(repo, name, f.skipped)),
          Err(e) => (BranchOutcome::failed(name.as_str(), e), Vec::new()),
        })
        .collect();

      for (branch, mut skipped) in fetched {
        out.branches.push(branch);
        out.skipped.append(&mut skipped);
      }
      Ok(out)
    })
  }

  /// One verdict per candidate branch: has every baseline change reached it?
  pub fn sync(&self, req: &DigestRequest, now: DateTime<Utc>) -> Result<Report<SyncVerdict>, RunError> {
    self.run(ReportKind::Sync, req, now, |repo, window| {
      let rc = self.repo_config(repo).map_err(|e| FetchError::Data(e.to_string()))?;
      let specs = req.branches.as_deref().unwrap_or(&rc.sync_branches);

      let mirror = rc.mirror.as_ref().map(|p| GitMirror::new(p.to_string_lossy()));
      let api_source: GithubCommits;
      let mirror_lister: MirrorBranches;
      let api_lister: GithubBranches;

      let (source, lister): (&dyn CommitSource, &dyn BranchLister) = match &mirror {
        Some(m) => {
          mirror_lister = MirrorBranches { mirror: m };
          (m, &mirror_lister)
        }
        None => {
          api_source = GithubCommits::new(Arc::clone(&self.sources.github), repo.clone());
          api_lister = GithubBranches {
            client: Arc::clone(&self.sources.github),
            repo: repo.clone(),
            cache: Arc::clone(&self.branch_cache),
          };
          (&api_source, &api_lister)
        }
      };

      self.sync_repo(repo, source, lister, specs, &req.baseline, window)
    })
  }

  fn sync_repo(
    &self,
    repo: &RepositoryRef,
    source: &dyn CommitSource,
    lister: &dyn BranchLister,
    specs: &[BranchSpec],
    baseline: &str,
    window: &TimeWindow,
  ) -> Result<RepoOutcome<SyncVerdict>, FetchError> {
    let mut out = RepoOutcome::new(repo.clone());

    let resolution = Resolver {
      branches: lister,
      tags: None,
      tag_prefixes: &self.cfg.tag_prefixes,
    }
    .resolve(specs, window);

    if let Some(e) = resolution.error {
      out.discovery_error = Some(e);
      return Ok(out);
    }

    let candidates: Vec<String> = resolution.names.into_iter().filter(|n| n != baseline).collect();
    if candidates.is_empty() {
      return Ok(out);
    }

    // A missing baseline is one failure on the baseline, not one per candidate.
    match self.attempt("baseline tip", || source.tip(baseline)) {
      Ok(tip) => debug!(repo = %repo, baseline, tip = %short_sha(&tip), "baseline resolved"),
      Err(e) if e.is_auth() => return Err(e),
      Err(e) => {
        out.branches.push(BranchOutcome::failed(baseline, e));
        return Ok(out);
      }
    }

    if self.sync_method == SyncMethod::Prefix {
      out.branches = candidates
        .par_iter()
        .map(|b| match self.attempt("prefix", || prefix_verdict(source, repo, baseline, b, window)) {
          Ok(v) => BranchOutcome::rows(b.as_str(), vec![v]),
          Err(e) => BranchOutcome::failed(b.as_str(), e),
        })
        .collect();
      return Ok(out);
    }

    let cmp = Comparator::new(source);
    let base = match self.attempt("baseline", || cmp.identity_set(baseline)) {
      Ok(set) => set,
      Err(e) if e.is_auth() => return Err(e),
      Err(e) => {
        out.branches.push(BranchOutcome::failed(baseline, e));
        return Ok(out);
      }
    };
    debug!(repo = %repo, commits = base.commits, unresolved = base.unresolved.len(), "baseline identities ready");

    out.branches = candidates
      .par_iter()
      .map(|b| match self.attempt("branch", || cmp.identity_set(b)) {
        Ok(set) => BranchOutcome::rows(b.as_str(), vec![verdict(repo, b, &base, &set)]),
        Err(e) => BranchOutcome::failed(b.as_str(), e),
      })
      .collect();
    Ok(out)
  }

  /// Organization repositories whose names start with a configured prefix (all when none are set).
  pub fn org_listing(&self, now: DateTime<Utc>) -> Result<OrgListing, FetchError> {
    let org = self.cfg.organization.as_str();
    let key = format!("org:{}", org);
    let listing = self
      .listing_cache
      .get_or_refresh(&key, || self.attempt("org repos", || self.sources.github.org_repos(org)))?;

    let prefixes = &self.cfg.repo_name_prefixes;
    let mut repositories: Vec<RepositoryListing> = listing
      .rows
      .iter()
      .filter(|r| prefixes.is_empty() || prefixes.iter().any(|p| r.name.starts_with(p.as_str())))
      .cloned()
      .collect();
    repositories.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(OrgListing {
      organization: org.to_string(),
      generated_at: now,
      repositories,
      skipped: listing.skipped.clone(),
    })
  }

  /// CI job pages for the selected repositories, keyed by `owner/name`.
  pub fn ci_links(&self, selection: &Selection) -> HashMap<String, String> {
    let (Some(jenkins), Ok(repos)) = (self.sources.jenkins.as_ref(), self.selected(selection)) else {
      return HashMap::new();
    };
    repos
      .iter()
      .filter_map(|r| {
        let rc = self.cfg.find_repository(r)?;
        Some((r.to_string(), jenkins.job_url(&rc.ci_path, r)))
      })
      .collect()
  }
}
