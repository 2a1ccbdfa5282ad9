// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Read commits and diffs from an existing local clone instead of the REST API
// role: sources/gitmirror
// inputs: Path to a clone (bare mirror or working copy with origin/* refs)
// outputs: CommitSummary lists, CommitDiff parsed from `git show`, branch names
// side_effects: Spawns `git` subprocesses (read-only; never fetches or checks out)
// invariants:
// - Refs resolve as refs/heads/<b>, then refs/remotes/origin/<b>, then refs/tags/<b>
// - An unresolvable ref is NotFound; an unparseable diff is Data
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::sources::{CommitDiff, CommitSource, CommitSummary, FileChange};
use crate::util::run_git;

pub struct GitMirror {
  path: String,
}

fn git(repo: &str, args: &[&str]) -> Result<String, FetchError> {
  let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
  run_git(repo, &args).map_err(|e| FetchError::Transient {
    status: None,
    detail: format!("{:#}", e),
  })
}

impl GitMirror {
  pub fn new(path: impl Into<String>) -> Self {
    Self { path: path.into() }
  }

  fn resolve(&self, reference: &str) -> Result<String, FetchError> {
    for candidate in [
      format!("refs/heads/{}", reference),
      format!("refs/remotes/origin/{}", reference),
      format!("refs/tags/{}", reference),
    ] {
      let spec = format!("{}^{{commit}}", candidate);
      if let Ok(out) = git(&self.path, &["rev-parse", "--verify", "--quiet", &spec]) {
        let sha = out.trim();
        if !sha.is_empty() {
          return Ok(sha.to_string());
        }
      }
    }
    Err(FetchError::NotFound)
  }

  /// Local and origin branch names, de-duplicated, `HEAD` excluded.
  pub fn branches(&self) -> Result<Vec<String>, FetchError> {
    let out = git(
      &self.path,
      &["for-each-ref", "--format=%(refname)", "refs/heads", "refs/remotes/origin"],
    )?;

    let mut names: Vec<String> = Vec::new();
    for line in out.lines() {
      let name = line
        .trim()
        .strip_prefix("refs/heads/")
        .or_else(|| line.trim().strip_prefix("refs/remotes/origin/"));
      if let Some(n) = name {
        if n != "HEAD" && !names.iter().any(|x| x == n) {
          names.push(n.to_string());
        }
      }
    }
    Ok(names)
  }

  fn rev_list(&self, tip: &str, extra: &[String]) -> Result<Vec<CommitSummary>, FetchError> {
    let mut args: Vec<&str> = vec!["-c", "log.showSignature=false", "rev-list", "--timestamp", "--parents"];
    args.extend(extra.iter().map(String::as_str));
    args.push(tip);
    Ok(parse_rev_list(&git(&self.path, &args)?))
  }
}

fn parse_rev_list(out: &str) -> Vec<CommitSummary> {
  out
    .lines()
    .filter_map(|l| {
      let mut parts = l.split_whitespace();
      let committed_at = parts
        .next()?
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
      let sha = parts.next()?.to_string();
      Some(CommitSummary {
        sha,
        parents: parts.count(),
        committed_at,
      })
    })
    .collect()
}

impl CommitSource for GitMirror {
  fn tip(&self, reference: &str) -> Result<String, FetchError> {
    self.resolve(reference)
  }

  fn commits(&self, reference: &str, since: Option<DateTime<Utc>>) -> Result<Vec<CommitSummary>, FetchError> {
    let tip = self.resolve(reference)?;
    let extra: Vec<String> = since
      .map(|ts| vec![format!("--since={}", ts.format("%Y-%m-%d %H:%M:%S +0000"))])
      .unwrap_or_default();
    self.rev_list(&tip, &extra)
  }

  fn head_commits(&self, reference: &str, limit: usize) -> Result<Vec<CommitSummary>, FetchError> {
    let tip = self.resolve(reference)?;
    self.rev_list(&tip, &[format!("--max-count={}", limit)])
  }

  fn diff(&self, sha: &str) -> Result<CommitDiff, FetchError> {
    let head = self.rev_list(sha, &["--max-count=1".to_string()])?;
    let parents = head.first().map(|c| c.parents).unwrap_or(0);
    let text = git(
      &self.path,
      &[
        "show",
        "--format=",
        "--no-color",
        "--no-ext-diff",
        "--no-renames",
        "--full-index",
        "--src-prefix=a/",
        "--dst-prefix=b/",
        "--patch",
        sha,
      ],
    )?;

    Ok(CommitDiff {
      sha: sha.to_string(),
      parents,
      files: parse_unified_diff(&text)?,
    })
  }
}

/// Split `git show --patch` output into per-file changes.
pub fn parse_unified_diff(text: &str) -> Result<Vec<FileChange>, FetchError> {
  let mut files: Vec<FileChange> = Vec::new();
  let mut in_hunks = false;

  for line in text.lines() {
    if let Some(rest) = line.strip_prefix("diff --git ") {
      let path = rest
        .rfind(" b/")
        .map(|i| rest[i + 3..].to_string())
        .ok_or_else(|| FetchError::Data(format!("unparseable diff header `{}`", line)))?;
      files.push(FileChange {
        path,
        patch: None,
        blob: None,
        binary: false,
      });
      in_hunks = false;
      continue;
    }

    let Some(cur) = files.last_mut() else {
      if line.trim().is_empty() {
        continue;
      }
      return Err(FetchError::Data(format!("diff text before any file header: `{}`", line)));
    };

    if line.starts_with("@@") {
      in_hunks = true;
    }

    if in_hunks {
      let patch = cur.patch.get_or_insert_with(String::new);
      patch.push_str(line);
      patch.push('\n');
      continue;
    }

    if let Some(p) = line.strip_prefix("+++ b/") {
      cur.path = p.to_string();
    } else if let Some(range) = line.strip_prefix("index ") {
      let post = range.split_whitespace().next().and_then(|r| r.split("..").nth(1));
      cur.blob = post.map(str::to_string);
    } else if line.starts_with("Binary files ") || line == "GIT binary patch" {
      cur.binary = true;
    }
  }

  Ok(files)
}
