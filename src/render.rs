// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Render reports and org listings as self-contained HTML digests
// role: rendering/html
// inputs: Report<R> for each row type, OrgListing, display timezone, CI job links
// outputs: UTF-8 HTML documents and email subjects
// invariants:
// - All remote text (titles, names, branch names, error details) is HTML-escaped
// - Display text for statuses lives here only; CSS classes use the stable status labels
// - Timestamps are shown in the configured display timezone
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::model::{BuildRecord, OrgListing, PullRequestRecord, Report, ReportKind, SyncVerdict};
use crate::status::{BranchStatus, RepoStatus};
use crate::window::TimeWindow;

const STYLE: &str = "body{font-family:Helvetica,Arial,sans-serif;font-size:14px;color:#222}\
table{border-collapse:collapse;margin:4px 0 16px 0}\
th,td{border:1px solid #ccc;padding:4px 8px;text-align:left}\
th{background:#f0f0f0}\
.status-populated{color:#1a7f37}\
.status-no-data-in-window{color:#6e7781}\
.status-branch-not-found{color:#9a6700}\
.status-fetch-failed{color:#cf222e}\
.status-no-applicable-branches{color:#6e7781}\
.status-aborted{color:#8250df}\
.result-SUCCESS{color:#1a7f37}.result-FAILURE{color:#cf222e}.result-UNSTABLE{color:#9a6700}\
.result-ABORTED{color:#6e7781}.result-UNKNOWN{color:#6e7781}\
.synced{color:#1a7f37}.not-synced{color:#cf222e}";

pub struct RenderOptions<'a> {
  pub tz: Tz,
  /// Repository (`owner/name`) to CI job page.
  pub ci_links: &'a HashMap<String, String>,
}

pub fn escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
  out
}

pub fn repo_status_text(status: &RepoStatus) -> String {
  match status {
    RepoStatus::Populated => "Records found".into(),
    RepoStatus::NoRecordsInWindow => "No activity in the window".into(),
    RepoStatus::NotFound => "Branch not found".into(),
    RepoStatus::FetchError(detail) => format!("Could not fetch data: {}", detail),
    RepoStatus::NoApplicableBranches => "No applicable branches".into(),
    RepoStatus::Aborted => "Not processed (run aborted)".into(),
  }
}

pub fn branch_status_text(status: &BranchStatus) -> String {
  match status {
    BranchStatus::FoundWithRecords => "Records found".into(),
    BranchStatus::FoundNoRecordsInWindow => "No activity in the window".into(),
    BranchStatus::NotFound => "Not found".into(),
    BranchStatus::FetchError(detail) => format!("Could not fetch data: {}", detail),
  }
}

fn local_time(ts: DateTime<Utc>, tz: Tz) -> String {
  ts.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string()
}

fn local_date(ts: DateTime<Utc>, tz: Tz) -> String {
  ts.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

fn duration_text(ms: Option<i64>) -> String {
  match ms {
    Some(ms) if ms >= 0 => {
      let secs = ms / 1000;
      if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
      } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
      }
    }
    _ => "n/a".into(),
  }
}

fn link(url: &str, text: &str) -> String {
  format!("<a href=\"{}\">{}</a>", escape(url), escape(text))
}

/// Email subject for a digest.
pub fn subject(kind: ReportKind, window: &TimeWindow, tz: Tz) -> String {
  format!(
    "{}: {} to {}",
    kind.title(),
    local_date(window.cutoff, tz),
    local_date(window.now, tz)
  )
}

/// How one row type is laid out in a branch table.
pub trait HtmlRow {
  fn headings() -> &'static [&'static str];
  /// Pre-escaped cell contents.
  fn cells(&self, tz: Tz) -> Vec<String>;
}

impl HtmlRow for PullRequestRecord {
  fn headings() -> &'static [&'static str] {
    &["#", "Title", "Author", "Merged"]
  }

  fn cells(&self, tz: Tz) -> Vec<String> {
    vec![
      link(&self.url, &format!("#{}", self.number)),
      escape(&self.title),
      escape(&self.author),
      escape(&local_time(self.merged_at, tz)),
    ]
  }
}

impl HtmlRow for BuildRecord {
  fn headings() -> &'static [&'static str] {
    &["Build", "Result", "Started", "Duration"]
  }

  fn cells(&self, tz: Tz) -> Vec<String> {
    let result = self.result.as_str();
    vec![
      link(&self.url, &format!("#{}", self.number)),
      format!("<span class=\"result-{}\">{}</span>", result, result),
      escape(&local_time(self.timestamp, tz)),
      duration_text(self.duration_ms),
    ]
  }
}

impl HtmlRow for SyncVerdict {
  fn headings() -> &'static [&'static str] {
    &["Synced", "Baseline commits", "Branch commits", "Unresolved"]
  }

  fn cells(&self, _tz: Tz) -> Vec<String> {
    let synced = if self.synced {
      "<span class=\"synced\">yes</span>".to_string()
    } else {
      "<span class=\"not-synced\">no</span>".to_string()
    };
    vec![
      synced,
      self.baseline_commits.to_string(),
      self.branch_commits.to_string(),
      escape(&self.unresolved.join(", ")),
    ]
  }
}

fn intro<R>(report: &Report<R>, tz: Tz) -> String {
  let from = local_date(report.window.cutoff, tz);
  let to = local_date(report.window.now, tz);
  let base = escape(&report.baseline);
  match report.kind {
    ReportKind::Prs => format!(
      "Pull requests merged into <b>{}</b> between {} and {} ({} days).",
      base, from, to, report.window.days
    ),
    ReportKind::Builds => format!(
      "Builds started between {} and {} ({} days).",
      from, to, report.window.days
    ),
    ReportKind::Sync => format!("Branches checked for every change on <b>{}</b>.", base),
  }
}

fn document(title: &str, body: &str) -> String {
  format!(
    "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
    escape(title),
    STYLE,
    body
  )
}

/// Full HTML digest for a report.
pub fn render_report<R: HtmlRow>(report: &Report<R>, opts: &RenderOptions<'_>) -> String {
  let mut body = String::new();
  let _ = writeln!(body, "<h1>{}</h1>", escape(report.kind.title()));
  let _ = writeln!(body, "<p>{}</p>", intro(report, opts.tz));

  for entry in &report.entries {
    let repo = entry.repository.to_string();
    let heading = match opts.ci_links.get(&repo) {
      Some(url) => link(url, &repo),
      None => escape(&repo),
    };
    let _ = writeln!(
      body,
      "<h2>{} <small class=\"status-{}\">{}</small></h2>",
      heading,
      entry.status.label(),
      escape(&repo_status_text(&entry.status))
    );

    for group in &entry.groups {
      let _ = writeln!(
        body,
        "<h3>{} <small class=\"status-{}\">{}</small></h3>",
        escape(&group.name),
        group.status.label(),
        escape(&branch_status_text(&group.status))
      );
      if group.rows.is_empty() {
        continue;
      }

      body.push_str("<table>\n<tr>");
      for h in R::headings() {
        let _ = write!(body, "<th>{}</th>", h);
      }
      body.push_str("</tr>\n");
      for row in &group.rows {
        body.push_str("<tr>");
        for cell in row.cells(opts.tz) {
          let _ = write!(body, "<td>{}</td>", cell);
        }
        body.push_str("</tr>\n");
      }
      body.push_str("</table>\n");
    }
  }

  if !report.warnings.is_empty() || !report.skipped.is_empty() {
    body.push_str("<h2>Notes</h2>\n<ul>\n");
    for w in &report.warnings {
      let _ = writeln!(body, "<li>{}</li>", escape(w));
    }
    for s in &report.skipped {
      let _ = writeln!(
        body,
        "<li>Skipped a record in {} ({}): {}</li>",
        escape(&s.repository.to_string()),
        escape(&s.branch),
        escape(&s.reason)
      );
    }
    body.push_str("</ul>\n");
  }

  let _ = writeln!(
    body,
    "<p><small>Generated {}</small></p>",
    escape(&local_time(report.generated_at, opts.tz))
  );
  document(report.kind.title(), &body)
}

pub fn render_listing(listing: &OrgListing, opts: &RenderOptions<'_>) -> String {
  let mut body = String::new();
  let title = format!("{} repositories", listing.organization);
  let _ = writeln!(body, "<h1>{}</h1>", escape(&title));
  body.push_str("<table>\n<tr><th>Repository</th><th>Default branch</th></tr>\n");
  for r in &listing.repositories {
    let _ = writeln!(
      body,
      "<tr><td>{}</td><td>{}</td></tr>",
      link(&r.url, &r.name),
      escape(r.default_branch.as_deref().unwrap_or(""))
    );
  }
  body.push_str("</table>\n");
  let _ = writeln!(
    body,
    "<p><small>Generated {}</small></p>",
    escape(&local_time(listing.generated_at, opts.tz))
  );
  document(&title, &body)
}
