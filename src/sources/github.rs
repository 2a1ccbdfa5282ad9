// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: GitHub REST endpoints used by the digests (repos, branches, tags, commits, pulls, users)
// role: sources/github
// inputs: Transport (HTTP or fixtures); API base URL; RepositoryRef; TimeWindow for PR listing
// outputs: Typed rows (PullRequestRecord, RepositoryListing, TagRef, CommitSummary, CommitDiff)
// side_effects: Network calls via Transport; per-run memo of user display names
// invariants:
// - Pull requests are listed with state=closed&base=<branch>; unmerged closed PRs are ignored
// - Listing stops early once a whole page (sorted by updated desc) predates the window
// - Display names fall back to the login and are memoized per run
// - Malformed records are skipped with a reason; the listing continues
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::ext::serde_json::JsonFetch;
use crate::model::{PullRequestRecord, RepositoryListing, RepositoryRef};
use crate::sources::transport::{query, Pages, Transport};
use crate::sources::{escape_segment, CommitDiff, CommitSource, CommitSummary, Fetched, FileChange};
use crate::window::{parse_utc, TimeWindow};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
  pub name: String,
  pub sha: String,
}

pub struct GithubClient {
  transport: Arc<dyn Transport>,
  api_url: String,
  names: Mutex<HashMap<String, String>>,
}

impl GithubClient {
  pub fn new(transport: Arc<dyn Transport>, api_url: &str) -> Self {
    Self {
      transport,
      api_url: api_url.trim_end_matches('/').to_string(),
      names: Mutex::new(HashMap::new()),
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.api_url, path)
  }

  fn repo_url(&self, repo: &RepositoryRef, rest: &str) -> String {
    self.url(&format!("/repos/{}/{}{}", repo.owner, repo.name, rest))
  }

  fn pages(&self, url: String, params: Vec<(String, String)>) -> Pages<'_> {
    Pages::new(self.transport.as_ref(), url, params)
  }

  pub fn org_repos(&self, org: &str) -> Result<Fetched<RepositoryListing>, FetchError> {
    let rows = self.pages(self.url(&format!("/orgs/{}/repos", org)), Vec::new()).collect_rows()?;
    let mut out = Fetched::default();

    for raw in &rows {
      out.absorb(parse_listing(raw).map(Some));
    }
    Ok(out)
  }

  /// Tip commit of `branch`; `NotFound` when the branch does not exist.
  pub fn branch_tip(&self, repo: &RepositoryRef, branch: &str) -> Result<String, FetchError> {
    let v = self
      .transport
      .get_json(&self.repo_url(repo, &format!("/branches/{}", escape_segment(branch))), &[])?;
    v.fetch("commit.sha").required::<String>()
  }

  pub fn branches(&self, repo: &RepositoryRef) -> Result<Vec<String>, FetchError> {
    let rows = self.pages(self.repo_url(repo, "/branches"), Vec::new()).collect_rows()?;
    Ok(rows.iter().filter_map(|b| b.fetch("name").to::<String>()).collect())
  }

  pub fn tags(&self, repo: &RepositoryRef) -> Result<Vec<TagRef>, FetchError> {
    let rows = self.pages(self.repo_url(repo, "/tags"), Vec::new()).collect_rows()?;
    let tags = rows
      .iter()
      .filter_map(|t| {
        Some(TagRef {
          name: t.fetch("name").to::<String>()?,
          sha: t.fetch("commit.sha").to::<String>()?,
        })
      })
      .collect();
    Ok(tags)
  }

  fn commit_json(&self, repo: &RepositoryRef, sha: &str) -> Result<Value, FetchError> {
    self.transport.get_json(&self.repo_url(repo, &format!("/commits/{}", sha)), &[])
  }

  /// Committer date of one commit (used to date tags).
  pub fn commit_date(&self, repo: &RepositoryRef, sha: &str) -> Result<DateTime<Utc>, FetchError> {
    let v = self.commit_json(repo, sha)?;
    let raw: String = v.fetch("commit.committer.date").required()?;
    parse_utc(&raw)
  }

  pub fn commit_diff(&self, repo: &RepositoryRef, sha: &str) -> Result<CommitDiff, FetchError> {
    parse_commit_diff(&self.commit_json(repo, sha)?)
  }

  pub fn commits(
    &self,
    repo: &RepositoryRef,
    reference: &str,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<CommitSummary>, FetchError> {
    let mut params = query(&[("sha", reference)]);
    if let Some(ts) = since {
      params.push(("since".into(), ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
    }
    let rows = self.pages(self.repo_url(repo, "/commits"), params).collect_rows()?;
    rows.iter().map(parse_commit_summary).collect()
  }

  pub fn head_commits(
    &self,
    repo: &RepositoryRef,
    reference: &str,
    limit: usize,
  ) -> Result<Vec<CommitSummary>, FetchError> {
    let mut out = Vec::new();

    for page in self.pages(self.repo_url(repo, "/commits"), query(&[("sha", reference)])) {
      for raw in page? {
        out.push(parse_commit_summary(&raw)?);
        if out.len() >= limit {
          return Ok(out);
        }
      }
    }
    Ok(out)
  }

  /// Merged pull requests into `base` whose merge time is inside `window`.
  pub fn merged_pulls(
    &self,
    repo: &RepositoryRef,
    base: &str,
    window: &TimeWindow,
  ) -> Result<Fetched<PullRequestRecord>, FetchError> {
    let params = query(&[
      ("state", "closed"),
      ("base", base),
      ("sort", "updated"),
      ("direction", "desc"),
    ]);
    let mut out = Fetched::default();

    for page in self.pages(self.repo_url(repo, "/pulls"), params) {
      let page = page?;
      let mut page_touches_window = false;

      for raw in &page {
        // merged_at <= updated_at, so a page updated entirely before the cutoff ends the scan.
        match raw.fetch("updated_at").to::<String>().map(|s| parse_utc(&s)) {
          Some(Ok(ts)) if !window.contains(ts) => {}
          _ => page_touches_window = true,
        }
        let parsed = parse_pull(raw, repo).map(|pr| pr.filter(|p| window.contains(p.merged_at)));
        out.absorb(parsed);
      }

      if !page_touches_window {
        debug!(repo = %repo, base, "remaining pull request pages predate the window");
        break;
      }
    }

    for pr in out.rows.iter_mut() {
      pr.author = self.display_name(&pr.author_login);
    }

    Ok(out)
  }

  /// Profile display name for `login`, falling back to the login itself.
  pub fn display_name(&self, login: &str) -> String {
    if let Some(hit) = self.names.lock().ok().and_then(|m| m.get(login).cloned()) {
      return hit;
    }

    let name = match self.transport.get_json(&self.url(&format!("/users/{}", login)), &[]) {
      Ok(v) => v
        .fetch("name")
        .to::<String>()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| login.to_string()),
      Err(e) => {
        debug!(login, error = %e, "user lookup failed; using login");
        login.to_string()
      }
    };

    if let Ok(mut m) = self.names.lock() {
      m.insert(login.to_string(), name.clone());
    }
    name
  }
}

fn parse_listing(raw: &Value) -> Result<RepositoryListing, FetchError> {
  Ok(RepositoryListing {
    name: raw.fetch("name").required()?,
    url: raw.fetch("html_url").to_or_default(),
    default_branch: raw.fetch("default_branch").to(),
  })
}

fn parse_pull(raw: &Value, repo: &RepositoryRef) -> Result<Option<PullRequestRecord>, FetchError> {
  let Some(merged_raw) = raw.fetch("merged_at").to::<String>() else {
    return Ok(None);
  };
  let merged_at = parse_utc(&merged_raw)?;
  let login = raw
    .fetch("user.login")
    .to::<String>()
    .unwrap_or_else(|| "ghost".to_string());

  Ok(Some(PullRequestRecord {
    repository: repo.clone(),
    number: raw.fetch("number").required()?,
    title: raw.fetch("title").to_or_default(),
    author: login.clone(),
    author_login: login,
    merged_at,
    url: raw.fetch("html_url").required()?,
  }))
}

fn parse_commit_summary(raw: &Value) -> Result<CommitSummary, FetchError> {
  Ok(CommitSummary {
    sha: raw.fetch("sha").required()?,
    parents: raw.fetch("parents").to::<Vec<Value>>().map(|p| p.len()).unwrap_or(0),
    committed_at: raw
      .fetch("commit.committer.date")
      .to::<String>()
      .and_then(|s| parse_utc(&s).ok()),
  })
}

fn parse_commit_diff(raw: &Value) -> Result<CommitDiff, FetchError> {
  let summary = parse_commit_summary(raw)?;
  let files = raw
    .fetch("files")
    .to::<Vec<Value>>()
    .unwrap_or_default()
    .iter()
    .map(|f| {
      let patch = f.fetch("patch").to::<String>();
      Ok(FileChange {
        path: f.fetch("filename").required()?,
        binary: patch.is_none(),
        patch,
        blob: f.fetch("sha").to(),
      })
    })
    .collect::<Result<Vec<_>, FetchError>>()?;

  Ok(CommitDiff {
    sha: summary.sha,
    parents: summary.parents,
    files,
  })
}

/// `CommitSource` view of one repository through the REST API.
pub struct GithubCommits {
  client: Arc<GithubClient>,
  repo: RepositoryRef,
}

impl GithubCommits {
  pub fn new(client: Arc<GithubClient>, repo: RepositoryRef) -> Self {
    Self { client, repo }
  }
}

impl CommitSource for GithubCommits {
  fn tip(&self, reference: &str) -> Result<String, FetchError> {
    self.client.branch_tip(&self.repo, reference)
  }

  fn commits(&self, reference: &str, since: Option<DateTime<Utc>>) -> Result<Vec<CommitSummary>, FetchError> {
    self.client.commits(&self.repo, reference, since)
  }

  fn head_commits(&self, reference: &str, limit: usize) -> Result<Vec<CommitSummary>, FetchError> {
    self.client.head_commits(&self.repo, reference, limit)
  }

  fn diff(&self, sha: &str) -> Result<CommitDiff, FetchError> {
    self.client.commit_diff(&self.repo, sha)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sources::transport::FixtureTransport;
  use serde_json::json;

  fn client(v: Value) -> GithubClient {
    GithubClient::new(Arc::new(FixtureTransport::from_value(v).unwrap()), "https://api.test/")
  }

  fn repo() -> RepositoryRef {
    RepositoryRef::new("acme", "api")
  }

  fn window() -> TimeWindow {
    TimeWindow::new(parse_utc("2025-08-15T12:00:00Z").unwrap(), 7)
  }

  #[test]
  fn merged_pulls_filters_window_and_skips_bad_rows() {
    let gh = client(json!({
      "/repos/acme/api/pulls": { "pages": [[
        { "number": 3, "title": "Recent", "html_url": "https://gh/acme/api/pull/3",
          "user": {"login": "ada"}, "merged_at": "2025-08-14T09:00:00Z", "updated_at": "2025-08-14T09:00:00Z" },
        { "number": 2, "title": "Closed unmerged", "html_url": "https://gh/acme/api/pull/2",
          "user": {"login": "bob"}, "merged_at": null, "updated_at": "2025-08-13T00:00:00Z" },
        { "number": 1, "title": "Broken", "html_url": "https://gh/acme/api/pull/1",
          "user": {"login": "bob"}, "merged_at": "yesterday", "updated_at": "2025-08-13T00:00:00Z" },
        { "number": 0, "title": "Too old", "html_url": "https://gh/acme/api/pull/0",
          "user": {"login": "bob"}, "merged_at": "2025-08-08T11:59:59Z", "updated_at": "2025-08-12T00:00:00Z" }
      ]]},
      "/users/ada": { "body": { "login": "ada", "name": "Ada Lovelace" } }
    }));

    let got = gh.merged_pulls(&repo(), "main", &window()).unwrap();
    assert_eq!(got.rows.len(), 1);
    assert_eq!(got.rows[0].number, 3);
    assert_eq!(got.rows[0].author, "Ada Lovelace");
    assert_eq!(got.rows[0].author_login, "ada");
    assert_eq!(got.skipped.len(), 1);
    assert!(got.skipped[0].contains("yesterday"));
  }

  #[test]
  fn merged_pulls_stops_once_a_page_predates_the_window() {
    let gh = client(json!({
      "/repos/acme/api/pulls": { "pages": [
        [{ "number": 9, "html_url": "u9", "user": {"login": "x"},
           "merged_at": "2025-07-01T00:00:00Z", "updated_at": "2025-07-01T00:00:00Z" }],
        { "status": 500 }
      ]}
    }));

    let got = gh.merged_pulls(&repo(), "main", &window()).unwrap();
    assert!(got.rows.is_empty());
  }

  #[test]
  fn display_name_falls_back_to_login() {
    let gh = client(json!({ "/users/blank": { "body": { "name": "  " } } }));
    assert_eq!(gh.display_name("blank"), "blank");
    assert_eq!(gh.display_name("unknown"), "unknown");
  }

  #[test]
  fn missing_branch_is_not_found() {
    let gh = client(json!({ "/repos/acme/api/branches/main": { "status": 404 } }));
    assert_eq!(gh.branch_tip(&repo(), "main"), Err(FetchError::NotFound));
  }

  #[test]
  fn branch_tip_escapes_the_branch_name() {
    let gh = client(json!({
      "/repos/acme/api/branches/feat%23x": { "body": { "name": "feat#x", "commit": { "sha": "f00" } } },
      "/repos/acme/api/branches/release%2F2.0": { "body": { "name": "release/2.0", "commit": { "sha": "r20" } } },
      "/repos/acme/api/branches/feat": { "body": { "name": "feat", "commit": { "sha": "wrong" } } }
    }));
    assert_eq!(gh.branch_tip(&repo(), "feat#x").unwrap(), "f00");
    assert_eq!(gh.branch_tip(&repo(), "release/2.0").unwrap(), "r20");
  }

  #[test]
  fn commit_diff_marks_patchless_files_binary() {
    let gh = client(json!({
      "/repos/acme/api/commits/abc": { "body": {
        "sha": "abc", "parents": [{"sha": "p"}],
        "files": [
          { "filename": "src/lib.rs", "sha": "b1", "patch": "@@ -1 +1 @@\n-a\n+b" },
          { "filename": "logo.png", "sha": "b2" }
        ]
      }}
    }));

    let d = gh.commit_diff(&repo(), "abc").unwrap();
    assert_eq!(d.parents, 1);
    assert!(!d.files[0].binary);
    assert!(d.files[1].binary);
    assert_eq!(d.files[1].blob.as_deref(), Some("b2"));
  }

  #[test]
  fn tags_and_commit_dates() {
    let gh = client(json!({
      "/repos/acme/api/tags": { "body": [ { "name": "v1.2.0", "commit": { "sha": "t1" } } ] },
      "/repos/acme/api/commits/t1": { "body": { "sha": "t1", "commit": { "committer": { "date": "2025-08-10T00:00:00Z" } } } }
    }));

    let tags = gh.tags(&repo()).unwrap();
    assert_eq!(tags, vec![TagRef { name: "v1.2.0".into(), sha: "t1".into() }]);
    assert_eq!(
      gh.commit_date(&repo(), "t1").unwrap(),
      parse_utc("2025-08-10T00:00:00Z").unwrap()
    );
  }
}
