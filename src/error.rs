// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Typed failure taxonomy shared by the adapters, the engine and the CLI
// role: errors/types
// outputs: FetchError (per-call outcome), ConfigError, NotifyError, RunError
// invariants:
// - 404 is always NotFound; 401 is always Auth; other non-2xx are Transient with the status
// - Timeouts and network failures are Transient without a status
// - Data never aborts a fetch; callers skip the offending record
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use thiserror::Error;

/// Outcome of a single remote call (or a single record parse) that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  #[error("not found")]
  NotFound,

  #[error("transient failure ({}): {detail}", status_label(.status))]
  Transient { status: Option<u16>, detail: String },

  #[error("authentication failed: {0}")]
  Auth(String),

  #[error("malformed data: {0}")]
  Data(String),
}

fn status_label(status: &Option<u16>) -> String {
  match status {
    Some(code) => format!("HTTP {}", code),
    None => "no response".into(),
  }
}

impl FetchError {
  /// Map a non-success HTTP status code onto the taxonomy.
  pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
    match status {
      404 => FetchError::NotFound,
      401 => FetchError::Auth(detail.into()),
      _ => FetchError::Transient {
        status: Some(status),
        detail: detail.into(),
      },
    }
  }

  pub fn network(detail: impl Into<String>) -> Self {
    FetchError::Transient {
      status: None,
      detail: detail.into(),
    }
  }

  pub fn is_transient(&self) -> bool {
    matches!(self, FetchError::Transient { .. })
  }

  pub fn is_auth(&self) -> bool {
    matches!(self, FetchError::Auth(_))
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("reading config {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("parsing config {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid config: {0}")]
  Invalid(String),

  #[error("missing credentials: {0}")]
  MissingCredentials(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("no recipients configured")]
  NoRecipients,

  #[error("spawning notifier `{command}`: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("notifier `{command}` exited with {status}: {stderr}")]
  Failed {
    command: String,
    status: String,
    stderr: String,
  },

  #[error("writing digest to {path}: {source}")]
  Write {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Failures that abort a whole run (no report is produced).
#[derive(Debug, Error)]
pub enum RunError {
  #[error("{repo}: {source}")]
  Auth {
    repo: String,
    #[source]
    source: FetchError,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("building worker pool: {0}")]
  Pool(#[from] rayon::ThreadPoolBuildError),
}
