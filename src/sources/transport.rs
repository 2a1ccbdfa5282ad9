// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: HTTP seam for remote sources: one GET returning JSON, plus lazy page-by-page listing
// role: sources/transport
// inputs: Absolute URL, query pairs; env DIGEST_TEST_FIXTURES selects the fixture-backed transport
// outputs: serde_json::Value or a classified FetchError; Pages iterator over list endpoints
// side_effects: Network calls (HttpTransport); reads one fixture file (FixtureTransport)
// invariants:
// - Every HTTP call carries the agent's global timeout; timeouts map to Transient(None)
// - 404 -> NotFound, 401 -> Auth, other non-2xx -> Transient(Some(status))
// - Pages uses per_page=100 and stops after an empty page or after yielding one error
// - No automatic retries at this layer
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

pub const PER_PAGE: u32 = 100;

pub type Query = Vec<(String, String)>;

pub trait Transport: Send + Sync {
  fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, FetchError>;
}

pub fn query(pairs: &[(&str, &str)]) -> Query {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

// --- Live transport ---

pub struct HttpTransport {
  agent: ureq::Agent,
  headers: Vec<(String, String)>,
}

impl HttpTransport {
  pub fn new(timeout: Duration) -> Self {
    let agent: ureq::Agent = ureq::Agent::config_builder()
      .timeout_global(Some(timeout))
      .http_status_as_error(false)
      .build()
      .into();

    Self {
      agent,
      headers: vec![(
        "User-Agent".into(),
        concat!("repo-digest/", env!("CARGO_PKG_VERSION")).into(),
      )],
    }
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.push((name.to_string(), value.into()));
    self
  }
}

fn clip(text: &str) -> String {
  let trimmed = text.trim();
  if trimmed.chars().count() <= 200 {
    return trimmed.to_string();
  }
  let mut out: String = trimmed.chars().take(200).collect();
  out.push('…');
  out
}

impl Transport for HttpTransport {
  fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
    let mut req = self.agent.get(url);

    for (name, value) in &self.headers {
      req = req.header(name.as_str(), value.as_str());
    }
    for (k, v) in query {
      req = req.query(k.as_str(), v.as_str());
    }

    debug!(url, ?query, "GET");

    let mut resp = req.call().map_err(|e| FetchError::network(format!("{}: {}", url, e)))?;
    let status = resp.status().as_u16();

    if (200..300).contains(&status) {
      return resp
        .body_mut()
        .read_json::<Value>()
        .map_err(|e| FetchError::Data(format!("{}: invalid JSON body: {}", url, e)));
    }

    let body = resp.body_mut().read_to_string().unwrap_or_default();
    Err(FetchError::from_status(status, format!("{}: {}", url, clip(&body))))
  }
}

// --- Fixture transport ---

/// Canned responses keyed by URL path (optionally `path?k=v&...` with paging params removed).
///
/// Each value is one of:
/// - `{"status": 404}` for a non-success response,
/// - `{"error": "timeout"}` for a transport failure,
/// - `{"body": <json>}` for a single response (page 1 only when paged),
/// - `{"pages": [<page1>, <page2>, ...]}` for paged listings.
#[derive(Debug, Default, Clone)]
pub struct FixtureTransport {
  routes: HashMap<String, Value>,
}

pub const FIXTURES_ENV: &str = "DIGEST_TEST_FIXTURES";

impl FixtureTransport {
  pub fn from_value(v: Value) -> Result<Self, FetchError> {
    let Value::Object(map) = v else {
      return Err(FetchError::Data("fixture root must be an object".into()));
    };
    Ok(Self {
      routes: map.into_iter().collect(),
    })
  }

  pub fn from_file(path: &Path) -> anyhow::Result<Self> {
    use anyhow::Context;

    let raw = std::fs::read_to_string(path).with_context(|| format!("reading fixtures {}", path.display()))?;
    let v: Value = serde_json::from_str(&raw).with_context(|| format!("parsing fixtures {}", path.display()))?;
    Ok(Self::from_value(v)?)
  }

  /// Fixture transport when `DIGEST_TEST_FIXTURES` names a file.
  pub fn from_env() -> anyhow::Result<Option<Self>> {
    match std::env::var(FIXTURES_ENV) {
      Ok(p) if !p.trim().is_empty() => Self::from_file(Path::new(p.trim())).map(Some),
      _ => Ok(None),
    }
  }

  fn route_keys(url: &str, query: &[(String, String)]) -> (String, String) {
    let path = url::Url::parse(url)
      .map(|u| u.path().to_string())
      .unwrap_or_else(|_| url.to_string());

    let mut filtered: Vec<String> = query
      .iter()
      .filter(|(k, _)| k != "page" && k != "per_page")
      .map(|(k, v)| format!("{}={}", k, v))
      .collect();
    filtered.sort();

    let full = if filtered.is_empty() {
      path.clone()
    } else {
      format!("{}?{}", path, filtered.join("&"))
    };
    (full, path)
  }
}

impl Transport for FixtureTransport {
  fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
    let (full, path) = Self::route_keys(url, query);
    let Some(entry) = self.routes.get(&full).or_else(|| self.routes.get(&path)) else {
      debug!(url, "no fixture route; answering 404");
      return Err(FetchError::NotFound);
    };

    if let Some(status) = entry.get("status").and_then(Value::as_u64) {
      return Err(FetchError::from_status(status as u16, format!("{}: fixture status", url)));
    }
    if let Some(err) = entry.get("error").and_then(Value::as_str) {
      return Err(FetchError::network(format!("{}: {}", url, err)));
    }

    let page = query
      .iter()
      .find(|(k, _)| k == "page")
      .and_then(|(_, v)| v.parse::<usize>().ok());

    if let Some(pages) = entry.get("pages").and_then(Value::as_array) {
      let idx = page.unwrap_or(1).saturating_sub(1);
      return match pages.get(idx) {
        Some(p) if p.get("status").is_some() => {
          let status = p.get("status").and_then(Value::as_u64).unwrap_or(500) as u16;
          Err(FetchError::from_status(status, format!("{}: fixture status", url)))
        }
        Some(p) => Ok(p.clone()),
        None => Ok(Value::Array(Vec::new())),
      };
    }

    let body = entry.get("body").cloned().unwrap_or(Value::Null);
    match page {
      Some(n) if n > 1 => Ok(Value::Array(Vec::new())),
      _ => Ok(body),
    }
  }
}

// --- Pagination ---

/// Lazy page-by-page listing of a GitHub-style list endpoint.
pub struct Pages<'a> {
  transport: &'a dyn Transport,
  url: String,
  params: Query,
  page: u32,
  done: bool,
}

impl<'a> Pages<'a> {
  pub fn new(transport: &'a dyn Transport, url: impl Into<String>, params: Query) -> Self {
    Self {
      transport,
      url: url.into(),
      params,
      page: 1,
      done: false,
    }
  }

  /// Drain every page. Any page error discards the rows gathered so far.
  pub fn collect_rows(self) -> Result<Vec<Value>, FetchError> {
    let mut rows = Vec::new();
    for page in self {
      rows.extend(page?);
    }
    Ok(rows)
  }
}

impl Iterator for Pages<'_> {
  type Item = Result<Vec<Value>, FetchError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }

    let mut q = self.params.clone();
    q.push(("per_page".into(), PER_PAGE.to_string()));
    q.push(("page".into(), self.page.to_string()));
    self.page += 1;

    match self.transport.get_json(&self.url, &q) {
      Ok(Value::Array(rows)) if rows.is_empty() => {
        self.done = true;
        None
      }
      Ok(Value::Array(rows)) => Some(Ok(rows)),
      Ok(other) => {
        self.done = true;
        Some(Err(FetchError::Data(format!(
          "{}: expected a JSON array page, got {}",
          self.url,
          kind_of(&other)
        ))))
      }
      Err(e) => {
        self.done = true;
        Some(Err(e))
      }
    }
  }
}

fn kind_of(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
