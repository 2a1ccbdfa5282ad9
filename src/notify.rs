// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Deliver a finished HTML digest through an opaque sink (sendmail-style command or a file)
// role: delivery/notify
// inputs: Notification { subject, html, recipients, sender }
// outputs: RFC 5322 message on the command's stdin, or the HTML written to a path
// side_effects: Spawns the configured command; writes files
// invariants:
// - Header values never carry CR or LF
// - Non-ASCII subjects are RFC 2047 encoded
// - A non-zero exit from the command is a delivery failure
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use base64::Engine as _;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::NotifyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub subject: String,
  pub html: String,
  pub recipients: Vec<String>,
  pub sender: Option<String>,
}

pub trait NotificationSink {
  fn deliver(&self, n: &Notification) -> Result<(), NotifyError>;
}

fn header_value(raw: &str) -> String {
  raw.chars().filter(|c| *c != '\r' && *c != '\n').collect::<String>().trim().to_string()
}

fn encoded_subject(raw: &str) -> String {
  let clean = header_value(raw);
  if clean.is_ascii() {
    clean
  } else {
    format!(
      "=?UTF-8?B?{}?=",
      base64::engine::general_purpose::STANDARD.encode(clean.as_bytes())
    )
  }
}

/// Build an HTML email message with headers.
pub fn rfc5322_message(n: &Notification, date: DateTime<Utc>) -> String {
  let mut msg = String::new();
  if let Some(from) = n.sender.as_deref() {
    msg.push_str(&format!("From: {}\r\n", header_value(from)));
  }
  let to: Vec<String> = n.recipients.iter().map(|r| header_value(r)).collect();
  msg.push_str(&format!("To: {}\r\n", to.join(", ")));
  msg.push_str(&format!("Subject: {}\r\n", encoded_subject(&n.subject)));
  msg.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
  msg.push_str("MIME-Version: 1.0\r\n");
  msg.push_str("Content-Type: text/html; charset=utf-8\r\n");
  msg.push_str("Content-Transfer-Encoding: 8bit\r\n");
  msg.push_str("\r\n");
  msg.push_str(&n.html);
  msg
}

/// Pipes the message into a sendmail-compatible command (default `sendmail -t`).
pub struct SendmailSink {
  command: String,
}

impl SendmailSink {
  pub fn new(command: impl Into<String>) -> Self {
    Self { command: command.into() }
  }
}

impl NotificationSink for SendmailSink {
  fn deliver(&self, n: &Notification) -> Result<(), NotifyError> {
    if n.recipients.is_empty() {
      return Err(NotifyError::NoRecipients);
    }

    let mut parts = self.command.split_whitespace();
    let program = parts.next().unwrap_or("sendmail");
    let mut child = Command::new(program)
      .args(parts)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| NotifyError::Spawn {
        command: self.command.clone(),
        source,
      })?;

    let message = rfc5322_message(n, Utc::now());
    if let Some(mut stdin) = child.stdin.take() {
      // The exit status decides success; a closed pipe shows up there.
      if let Err(e) = stdin.write_all(message.as_bytes()) {
        debug!(command = %self.command, error = %e, "writing message to notifier");
      }
    }

    let output = child.wait_with_output().map_err(|source| NotifyError::Spawn {
      command: self.command.clone(),
      source,
    })?;

    if !output.status.success() {
      return Err(NotifyError::Failed {
        command: self.command.clone(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    info!(recipients = n.recipients.len(), subject = %n.subject, "digest sent");
    Ok(())
  }
}

/// Writes the HTML body to a file; used for previews and tests.
pub struct FileSink {
  path: PathBuf,
}

impl FileSink {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl NotificationSink for FileSink {
  fn deliver(&self, n: &Notification) -> Result<(), NotifyError> {
    let write_err = |source| NotifyError::Write {
      path: self.path.display().to_string(),
      source,
    };
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(&self.path, n.html.as_bytes()).map_err(write_err)?;
    info!(path = %self.path.display(), "digest written");
    Ok(())
  }
}
