// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Command-line surface and its merge with the file configuration into one EffectiveConfig
// role: cli/normalize
// inputs: Cli flags; DigestConfig (already validated)
// outputs: EffectiveConfig (request, delivery targets, engine knobs)
// invariants:
// - Flags override file values; file values override built-in defaults
// - Every flag value is validated here, before any network traffic
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::compare::SyncMethod;
use crate::config::{DigestConfig, RepositoryConfig};
use crate::model::BranchSpec;
use crate::processor::{DigestRequest, Selection};
use crate::window::parse_now_override;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  /// Merged pull requests into the baseline branch
  Prs,
  /// CI builds per branch and release tag
  Builds,
  /// Whether candidate branches contain every baseline change
  Sync,
  /// Organization repository listing
  Repos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  pub fn as_directive(&self) -> &'static str {
    match self {
      LogLevel::Error => "error",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }
}

#[derive(Parser, Debug)]
#[command(
    name = "repo-digest",
    version,
    about = "Aggregate merged PRs, CI builds and branch sync into an HTML digest",
    long_about = None
)]
pub struct Cli {
  /// Configuration file (TOML)
  #[arg(long, env = "DIGEST_CONFIG")]
  pub config: Option<PathBuf>,

  /// Which digest to produce
  #[arg(long, value_enum, default_value_t = Kind::Prs)]
  pub kind: Kind,

  /// Limit the run to these repositories (`name` or `owner/name`; repeatable)
  #[arg(long = "repo")]
  pub repos: Vec<String>,

  /// Override branch specs: `main`, `release/*` or `dynamic` (repeatable)
  #[arg(long = "branch")]
  pub branches: Vec<String>,

  /// Baseline branch (default: config `baseline`, then "main")
  #[arg(long)]
  pub baseline: Option<String>,

  /// Lookback window in days (default: config `lookback_days`)
  #[arg(long)]
  pub days: Option<u32>,

  /// Write the report JSON here ("-" = stdout)
  #[arg(long)]
  pub out: Option<String>,

  /// Write the HTML digest to this file
  #[arg(long)]
  pub html: Option<PathBuf>,

  /// Email the HTML digest to the configured recipients
  #[arg(long)]
  pub notify: bool,

  /// Worker threads (default: config `concurrency`)
  #[arg(long)]
  pub concurrency: Option<usize>,

  /// How branch sync is decided
  #[arg(long, value_enum, default_value_t = SyncMethod::Fingerprint)]
  pub sync_method: SyncMethod,

  /// Retries for transient failures per call (default: config `retries`)
  #[arg(long)]
  pub retries: Option<u32>,

  /// Cancel unfinished repositories after this many seconds
  #[arg(long)]
  pub max_run_secs: Option<u64>,

  /// Log level when RUST_LOG is not set
  #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
  pub log_level: LogLevel,

  /// Emit a troff man page to stdout (internal; for packaging)
  #[arg(long, hide = true)]
  pub gen_man: bool,

  /// Override the "now" instant, RFC3339 (hidden; tests only)
  #[arg(long = "now-override", hide = true)]
  pub now_override: Option<String>,
}

#[derive(Debug)]
pub struct EffectiveConfig {
  pub kind: Kind,
  pub request: DigestRequest,
  pub out: Option<String>,
  pub html: Option<PathBuf>,
  pub notify: bool,
  pub concurrency: usize,
  pub retries: u32,
  pub sync_method: SyncMethod,
  pub max_run_secs: Option<u64>,
  pub now: Option<chrono::DateTime<chrono::Utc>>,
}

impl EffectiveConfig {
  /// Configured repositories this run covers; unknown `--repo` names are left for the engine to report.
  fn selected<'a>(&self, cfg: &'a DigestConfig) -> Vec<&'a RepositoryConfig> {
    match &self.request.selection {
      Selection::Defaults => cfg.repositories.iter().collect(),
      Selection::Named(names) => names
        .iter()
        .filter_map(|n| cfg.select(n).ok())
        .filter_map(|r| cfg.find_repository(&r))
        .collect(),
    }
  }

  /// Does this run talk to the GitHub API at all?
  pub fn needs_github(&self, cfg: &DigestConfig) -> bool {
    match self.kind {
      Kind::Prs | Kind::Repos => true,
      Kind::Sync => self.selected(cfg).iter().any(|r| r.mirror.is_none()),
      Kind::Builds => {
        let dynamic = |specs: &[BranchSpec]| specs.contains(&BranchSpec::Dynamic);
        match &self.request.branches {
          Some(specs) => dynamic(specs),
          None => self.selected(cfg).iter().any(|r| dynamic(&r.branches)),
        }
      }
    }
  }
}

pub fn normalize(cli: &Cli, cfg: &DigestConfig) -> Result<EffectiveConfig> {
  let concurrency = cli.concurrency.unwrap_or(cfg.concurrency);
  if concurrency == 0 {
    bail!("--concurrency must be at least 1");
  }
  if cli.max_run_secs == Some(0) {
    bail!("--max-run-secs must be at least 1");
  }

  let now = match cli.now_override.as_deref() {
    Some(raw) => match parse_now_override(Some(raw)) {
      Some(t) => Some(t),
      None => bail!("--now-override `{}` is not an RFC3339 timestamp", raw),
    },
    None => None,
  };

  let selection = if cli.repos.is_empty() {
    Selection::Defaults
  } else {
    Selection::Named(cli.repos.clone())
  };

  let branches = cli
    .branches
    .iter()
    .map(|b| b.parse::<BranchSpec>().map_err(|e| anyhow::anyhow!("--branch: {}", e)))
    .collect::<Result<Vec<_>>>()?;

  let baseline = cli.baseline.as_deref().unwrap_or(&cfg.baseline);
  let days = cli.days.unwrap_or(cfg.lookback_days);
  let request = DigestRequest::new(selection, baseline, days)?.with_branches(branches);

  if cli.notify && cfg.notify.recipients.is_empty() {
    bail!("--notify needs [notify] recipients in the configuration");
  }

  Ok(EffectiveConfig {
    kind: cli.kind,
    request,
    out: cli.out.clone(),
    html: cli.html.clone(),
    notify: cli.notify,
    concurrency,
    retries: cli.retries.unwrap_or(cfg.retries),
    sync_method: cli.sync_method,
    max_run_secs: cli.max_run_secs,
    now,
  })
}
