// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Dotted-path lookups on API payloads with optional and required typed extraction
// role: extension/serde_json
// outputs: JsonFetch trait and JsonFetched wrapper (to, to_or_default, required)
// invariants: No panics; missing paths yield None; required() turns absence into FetchError::Data
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use serde::de::DeserializeOwned;

use crate::error::FetchError;

/// A location inside a JSON document, remembered with the path that produced it.
pub struct JsonFetched<'a> {
  path: &'a str,
  inner: Option<&'a serde_json::Value>,
}

impl<'a> JsonFetched<'a> {
  /// Deserialize as `T`; `None` when missing, null, or of the wrong shape.
  pub fn to<T>(&self) -> Option<T>
  where
    T: DeserializeOwned,
  {
    self
      .inner
      .filter(|v| !v.is_null())
      .and_then(|v| T::deserialize(v).ok())
  }

  pub fn to_or_default<T>(&self) -> T
  where
    T: DeserializeOwned + Default,
  {
    self.to::<T>().unwrap_or_default()
  }

  /// Like `to`, but a missing or mistyped field is a `Data` error naming the path.
  pub fn required<T>(&self) -> Result<T, FetchError>
  where
    T: DeserializeOwned,
  {
    self
      .to::<T>()
      .ok_or_else(|| FetchError::Data(format!("missing or invalid field `{}`", self.path)))
  }
}

/// Fetch nested values via dotted paths like "user.login".
pub trait JsonFetch {
  fn fetch<'a>(&'a self, path: &'a str) -> JsonFetched<'a>;
}

impl JsonFetch for serde_json::Value {
  fn fetch<'a>(&'a self, path: &'a str) -> JsonFetched<'a> {
    if path.is_empty() {
      return JsonFetched { path, inner: Some(self) };
    }

    let mut cur = self;

    for key in path.split('.') {
      match cur.get(key) {
        Some(next) => cur = next,
        None => return JsonFetched { path, inner: None },
      }
    }

    JsonFetched { path, inner: Some(cur) }
  }
}
