// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Jenkins JSON API endpoints for multibranch jobs (child job discovery, recent builds)
// role: sources/jenkins
// inputs: Transport; CI base URL; per-repository job path; branch names in display (unescaped) form
// outputs: Unescaped child job names; BuildRecord rows inside the window
// invariants:
// - Branch names are percent-escaped (including '/') in job URLs and unescaped for display/matching
// - A missing job is NotFound; build results outside the closed set map to UNKNOWN
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::error::FetchError;
use crate::ext::serde_json::JsonFetch;
use crate::model::{BuildRecord, BuildResult, RepositoryRef};
use crate::sources::transport::{query, Transport};
use crate::sources::{escape_segment, Fetched};
use crate::window::{from_epoch_millis, TimeWindow};

const BUILDS_TREE: &str = "builds[number,url,timestamp,result,id,duration]";
const JOBS_TREE: &str = "jobs[name,url]";

pub fn escape_job_name(name: &str) -> String {
  escape_segment(name)
}

pub fn unescape_job_name(name: &str) -> String {
  percent_decode_str(name).decode_utf8_lossy().into_owned()
}

pub struct JenkinsClient {
  transport: Arc<dyn Transport>,
  base_url: String,
}

impl JenkinsClient {
  pub fn new(transport: Arc<dyn Transport>, base_url: &str) -> Self {
    Self {
      transport,
      base_url: base_url.trim_end_matches('/').to_string(),
    }
  }

  /// Human-facing page of the repository's multibranch job.
  pub fn job_url(&self, ci_path: &str, repo: &RepositoryRef) -> String {
    format!("{}{}/job/{}/", self.base_url, ci_path, escape_job_name(&repo.name))
  }

  fn api_url(&self, ci_path: &str, repo: &RepositoryRef, branch: Option<&str>) -> String {
    let mut url = self.job_url(ci_path, repo);
    if let Some(b) = branch {
      url.push_str(&format!("job/{}/", escape_job_name(b)));
    }
    url.push_str("api/json");
    url
  }

  /// Child job names (branches and tags), unescaped.
  pub fn child_jobs(&self, ci_path: &str, repo: &RepositoryRef) -> Result<Vec<String>, FetchError> {
    let v = self
      .transport
      .get_json(&self.api_url(ci_path, repo, None), &query(&[("tree", JOBS_TREE)]))?;

    let jobs = v.fetch("jobs").to::<Vec<Value>>().unwrap_or_default();
    Ok(
      jobs
        .iter()
        .filter_map(|j| j.fetch("name").to::<String>())
        .map(|n| unescape_job_name(&n))
        .collect(),
    )
  }

  /// Builds of one branch job whose start time is inside `window`.
  pub fn builds(
    &self,
    ci_path: &str,
    repo: &RepositoryRef,
    branch: &str,
    window: &TimeWindow,
  ) -> Result<Fetched<BuildRecord>, FetchError> {
    let v = self
      .transport
      .get_json(&self.api_url(ci_path, repo, Some(branch)), &query(&[("tree", BUILDS_TREE)]))?;

    let mut out = Fetched::default();
    for raw in v.fetch("builds").to::<Vec<Value>>().unwrap_or_default() {
      let parsed = parse_build(&raw, repo, branch).map(|b| Some(b).filter(|b| window.contains(b.timestamp)));
      out.absorb(parsed);
    }
    Ok(out)
  }
}

fn parse_build(raw: &Value, repo: &RepositoryRef, branch: &str) -> Result<BuildRecord, FetchError> {
  let millis: i64 = raw.fetch("timestamp").required()?;

  Ok(BuildRecord {
    repository: repo.clone(),
    branch: branch.to_string(),
    number: raw.fetch("number").required()?,
    result: BuildResult::from_raw(raw.fetch("result").to::<String>().as_deref()),
    timestamp: from_epoch_millis(millis)?,
    duration_ms: raw.fetch("duration").to(),
    url: raw.fetch("url").required()?,
  })
}
