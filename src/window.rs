use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Lookback window anchored at an injected "now".
///
/// A record is inside the window iff its timestamp is strictly after `cutoff`;
/// a record stamped exactly at the cutoff is outside.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct TimeWindow {
  pub now: DateTime<Utc>,
  pub cutoff: DateTime<Utc>,
  pub days: u32,
}

impl TimeWindow {
  pub fn new(now: DateTime<Utc>, days: u32) -> Self {
    Self {
      now,
      cutoff: now - Duration::days(days as i64),
      days,
    }
  }

  pub fn contains(&self, ts: DateTime<Utc>) -> bool {
    ts > self.cutoff
  }

  /// Keep the items whose timestamp is inside the window; items without a timestamp are dropped.
  pub fn retain<T, F>(&self, items: Vec<T>, ts: F) -> Vec<T>
  where
    F: Fn(&T) -> Option<DateTime<Utc>>,
  {
    items
      .into_iter()
      .filter(|item| ts(item).map(|t| self.contains(t)).unwrap_or(false))
      .collect()
  }

  /// `YYYY-MM-DD → YYYY-MM-DD` label used in digest headings.
  pub fn label(&self) -> String {
    format!("{} → {}", self.cutoff.format("%Y-%m-%d"), self.now.format("%Y-%m-%d"))
  }
}

/// Parse a remote ISO-8601 timestamp as UTC.
///
/// Accepts RFC3339 with any offset (normalized to UTC) and the naive
/// `%Y-%m-%dT%H:%M:%S` form, which is taken to already be UTC.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>, FetchError> {
  let raw = raw.trim();

  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|n| n.and_utc()))
    .map_err(|_| FetchError::Data(format!("unparseable timestamp `{}`", raw)))
}

/// Convert a CI epoch-millis timestamp into UTC.
pub fn from_epoch_millis(ms: i64) -> Result<DateTime<Utc>, FetchError> {
  DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| FetchError::Data(format!("timestamp out of range: {}", ms)))
}

/// Parse a `--now-override` string (hidden; tests only).
pub fn parse_now_override(s: Option<&str>) -> Option<DateTime<Utc>> {
  s.and_then(|raw| parse_utc(raw).ok())
}

/// Returns the effective "now" given an optional override.
pub fn effective_now(override_now: Option<DateTime<Utc>>) -> DateTime<Utc> {
  override_now.unwrap_or_else(Utc::now)
}
