// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Load, default and validate the TOML configuration; discover credentials from the environment
// role: config/loader
// inputs: Path from --config / DIGEST_CONFIG (default repo-digest.toml); env GITHUB_TOKEN, GH_TOKEN, JENKINS_USER, JENKINS_API_TOKEN
// outputs: DigestConfig with defaults applied; RepositoryRef list in configured order; auth header values
// side_effects: Reads one file; may spawn `gh auth token`
// invariants:
// - Validation happens before any network call and reports the first problem found
// - Credentials never come from the config file
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::path::{Path, PathBuf};

use base64::Engine as _;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{BranchSpec, RepositoryRef};
use crate::sources::github::DEFAULT_API_URL;

pub const DEFAULT_CONFIG_FILE: &str = "repo-digest.toml";

// GitHub owner and repository names
static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("name pattern"));
static RE_MAILBOX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s<>]+@[^@\s<>]+$").expect("mailbox pattern"));

fn default_baseline() -> String {
  "main".into()
}
fn default_lookback_days() -> u32 {
  7
}
fn default_concurrency() -> usize {
  4
}
fn default_http_timeout_secs() -> u64 {
  10
}
fn default_cache_refresh_secs() -> u64 {
  3600
}
fn default_tag_prefixes() -> Vec<String> {
  vec!["v1".into(), "v2".into()]
}
fn default_timezone() -> String {
  "UTC".into()
}
fn default_api_url() -> String {
  DEFAULT_API_URL.into()
}
fn default_notify_command() -> String {
  "sendmail -t".into()
}
fn default_branches() -> Vec<BranchSpec> {
  vec![BranchSpec::Literal("main".into())]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GithubSection {
  #[serde(default = "default_api_url")]
  pub api_url: String,
}

impl Default for GithubSection {
  fn default() -> Self {
    Self {
      api_url: default_api_url(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CiSection {
  pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifySection {
  pub sender: Option<String>,
  #[serde(default)]
  pub recipients: Vec<String>,
  pub subject: Option<String>,
  #[serde(default = "default_notify_command")]
  pub command: String,
}

impl Default for NotifySection {
  fn default() -> Self {
    Self {
      sender: None,
      recipients: Vec::new(),
      subject: None,
      command: default_notify_command(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
  pub name: String,
  /// Defaults to the top-level `organization`.
  pub owner: Option<String>,
  /// Branch specs for the build report.
  #[serde(default = "default_branches")]
  pub branches: Vec<BranchSpec>,
  /// Candidate branches for the sync report, e.g. `develop/*`.
  #[serde(default)]
  pub sync_branches: Vec<BranchSpec>,
  /// Jenkins folder path above the repository job, e.g. `/job/obp/job/product/job/app`.
  #[serde(default)]
  pub ci_path: String,
  /// Existing local clone used for commit listing and diffs.
  pub mirror: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigestConfig {
  #[serde(default)]
  pub organization: String,
  #[serde(default = "default_baseline")]
  pub baseline: String,
  #[serde(default = "default_lookback_days")]
  pub lookback_days: u32,
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
  #[serde(default = "default_http_timeout_secs")]
  pub http_timeout_secs: u64,
  #[serde(default = "default_cache_refresh_secs")]
  pub cache_refresh_secs: u64,
  #[serde(default)]
  pub retries: u32,
  #[serde(default = "default_tag_prefixes")]
  pub tag_prefixes: Vec<String>,
  /// Name prefixes kept by the organization repository listing; empty keeps all.
  #[serde(default)]
  pub repo_name_prefixes: Vec<String>,
  #[serde(default = "default_timezone")]
  pub display_timezone: String,
  #[serde(default)]
  pub github: GithubSection,
  pub ci: Option<CiSection>,
  #[serde(default)]
  pub notify: NotifySection,
  #[serde(default)]
  pub repositories: Vec<RepositoryConfig>,
}

impl DigestConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::parse(&raw, &path.display().to_string())
  }

  pub fn parse(raw: &str, origin: &str) -> Result<Self, ConfigError> {
    let mut cfg: DigestConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
      path: origin.to_string(),
      source,
    })?;
    cfg.normalize();
    Ok(cfg)
  }

  fn normalize(&mut self) {
    self.baseline = self.baseline.trim().to_string();
    self.organization = self.organization.trim().to_string();
    for r in self.repositories.iter_mut() {
      r.name = r.name.trim().to_string();
      r.ci_path = normalize_ci_path(&r.ci_path);
    }
  }

  /// Check everything that can be checked without touching the network.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    if self.lookback_days == 0 {
      return invalid("lookback_days must be a positive number of days".into());
    }
    if self.concurrency == 0 {
      return invalid("concurrency must be at least 1".into());
    }
    if self.http_timeout_secs == 0 {
      return invalid("http_timeout_secs must be at least 1".into());
    }
    if self.baseline.is_empty() {
      return invalid("baseline branch must not be empty".into());
    }
    if self.repositories.is_empty() {
      return invalid("at least one [[repositories]] entry is required".into());
    }
    for r in &self.repositories {
      if r.name.is_empty() {
        return invalid("repository name must not be empty".into());
      }
      if !RE_NAME.is_match(&r.name) {
        return invalid(format!("repository name `{}` is not a valid GitHub name", r.name));
      }
      if let Some(owner) = r.owner.as_deref().filter(|o| !o.trim().is_empty()) {
        if !RE_NAME.is_match(owner.trim()) {
          return invalid(format!("repository owner `{}` is not a valid GitHub name", owner));
        }
      }
      if r.owner.as_deref().map(str::trim).unwrap_or("").is_empty() && self.organization.is_empty() {
        return invalid(format!(
          "repository `{}` has no owner and no top-level organization is set",
          r.name
        ));
      }
    }
    if self.display_timezone.parse::<Tz>().is_err() {
      return invalid(format!("unknown display_timezone `{}`", self.display_timezone));
    }
    if let Err(e) = url::Url::parse(&self.github.api_url) {
      return invalid(format!("github.api_url `{}`: {}", self.github.api_url, e));
    }
    if let Some(ci) = &self.ci {
      if let Err(e) = url::Url::parse(&ci.url) {
        return invalid(format!("ci.url `{}`: {}", ci.url, e));
      }
    }
    if let Some(bad) = self.notify.recipients.iter().find(|r| !RE_MAILBOX.is_match(r.trim())) {
      return invalid(format!("notify recipient `{}` is not an email address", bad));
    }
    Ok(())
  }

  pub fn timezone(&self) -> Tz {
    self.display_timezone.parse::<Tz>().unwrap_or(Tz::UTC)
  }

  pub fn repository_ref(&self, r: &RepositoryConfig) -> RepositoryRef {
    let owner = r
      .owner
      .as_deref()
      .map(str::trim)
      .filter(|o| !o.is_empty())
      .unwrap_or(&self.organization);
    RepositoryRef::new(owner, r.name.clone())
  }

  /// Configured repositories in file order.
  pub fn repository_refs(&self) -> Vec<RepositoryRef> {
    self.repositories.iter().map(|r| self.repository_ref(r)).collect()
  }

  pub fn find_repository(&self, repo: &RepositoryRef) -> Option<&RepositoryConfig> {
    self.repositories.iter().find(|r| &self.repository_ref(r) == repo)
  }

  /// Resolve a `--repo` argument (`name` or `owner/name`) against the configuration.
  pub fn select(&self, arg: &str) -> Result<RepositoryRef, ConfigError> {
    let arg = arg.trim();
    self
      .repositories
      .iter()
      .map(|r| self.repository_ref(r))
      .find(|r| r.to_string() == arg || r.name == arg)
      .ok_or_else(|| ConfigError::Invalid(format!("repository `{}` is not configured", arg)))
  }
}

fn normalize_ci_path(raw: &str) -> String {
  let trimmed = raw.trim().trim_matches('/');
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("/{}", trimmed)
  }
}

/// Resolve the config path: explicit flag/env value first, then `repo-digest.toml` in the working directory.
pub fn config_path(flag: Option<&Path>) -> PathBuf {
  flag
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Discover a GitHub token: GITHUB_TOKEN, then GH_TOKEN, then `gh auth token`.
pub fn github_token() -> Option<String> {
  for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
    if let Ok(t) = std::env::var(var) {
      if !t.trim().is_empty() {
        return Some(t.trim().to_string());
      }
    }
  }

  if let Ok(output) = std::process::Command::new("gh").args(["auth", "token"]).output() {
    if output.status.success() {
      let t = String::from_utf8_lossy(&output.stdout).trim().to_string();
      if !t.is_empty() {
        return Some(t);
      }
    }
  }

  None
}

/// `Authorization` header value for Jenkins when both JENKINS_USER and JENKINS_API_TOKEN are set.
pub fn jenkins_basic_auth() -> Option<String> {
  let user = std::env::var("JENKINS_USER").ok().filter(|s| !s.trim().is_empty())?;
  let token = std::env::var("JENKINS_API_TOKEN").ok().filter(|s| !s.trim().is_empty())?;
  let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user.trim(), token.trim()));
  Some(format!("Basic {}", encoded))
}
