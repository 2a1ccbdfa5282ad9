use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod cache;
mod cli;
mod compare;
mod config;
mod error;
mod ext;
mod fingerprint;
mod model;
mod notify;
mod processor;
mod render;
mod resolver;
mod sources;
mod status;
mod util;
mod window;

use crate::cache::SystemClock;
use crate::cli::{normalize, Cli, EffectiveConfig, Kind};
use crate::config::{github_token, jenkins_basic_auth, DigestConfig};
use crate::error::ConfigError;
use crate::model::Report;
use crate::notify::{FileSink, Notification, NotificationSink, SendmailSink};
use crate::processor::{CancelToken, Engine, EngineOptions, Sources};
use crate::render::{HtmlRow, RenderOptions};
use crate::sources::github::GithubClient;
use crate::sources::jenkins::JenkinsClient;
use crate::sources::transport::{FixtureTransport, HttpTransport, Transport};

const EXIT_FATAL: u8 = 1;
const EXIT_DELIVERY: u8 = 2;

fn init_logging(cli: &Cli) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_directive()));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
}

fn build_sources(eff: &EffectiveConfig, cfg: &DigestConfig) -> Result<Sources> {
  let ci_url = cfg.ci.as_ref().map(|c| c.url.as_str());

  if let Some(fixtures) = FixtureTransport::from_env()? {
    info!("serving remote calls from fixtures");
    let shared: Arc<dyn Transport> = Arc::new(fixtures);
    return Ok(Sources {
      github: Arc::new(GithubClient::new(Arc::clone(&shared), &cfg.github.api_url)),
      jenkins: ci_url.map(|u| Arc::new(JenkinsClient::new(Arc::clone(&shared), u))),
    });
  }

  let timeout = Duration::from_secs(cfg.http_timeout_secs);
  let mut gh = HttpTransport::new(timeout)
    .with_header("Accept", "application/vnd.github+json")
    .with_header("X-GitHub-Api-Version", "2022-11-28");
  match github_token() {
    Some(token) => gh = gh.with_header("Authorization", format!("Bearer {}", token)),
    None if eff.needs_github(cfg) => {
      return Err(ConfigError::MissingCredentials("set GITHUB_TOKEN or GH_TOKEN, or log in with `gh auth login`".into()).into())
    }
    None => {}
  }

  let jenkins = ci_url.map(|u| {
    let mut t = HttpTransport::new(timeout);
    if let Some(auth) = jenkins_basic_auth() {
      t = t.with_header("Authorization", auth);
    }
    Arc::new(JenkinsClient::new(Arc::new(t), u))
  });

  Ok(Sources {
    github: Arc::new(GithubClient::new(Arc::new(gh), &cfg.github.api_url)),
    jenkins,
  })
}

fn json_target(eff: &EffectiveConfig) -> Option<String> {
  match (&eff.out, &eff.html, eff.notify) {
    (Some(out), _, _) => Some(out.clone()),
    (None, None, false) => Some("-".into()),
    _ => None,
  }
}

/// Deliver rendered HTML; returns whether every requested delivery succeeded.
fn deliver_html(eff: &EffectiveConfig, cfg: &DigestConfig, subject: String, html: String) -> bool {
  let mut ok = true;
  let note = Notification {
    subject,
    html,
    recipients: cfg.notify.recipients.clone(),
    sender: cfg.notify.sender.clone(),
  };

  if let Some(path) = &eff.html {
    if let Err(e) = FileSink::new(path).deliver(&note) {
      error!(error = %e, "html output failed");
      ok = false;
    }
  }
  if eff.notify {
    if let Err(e) = SendmailSink::new(cfg.notify.command.clone()).deliver(&note) {
      error!(error = %e, "notification failed");
      ok = false;
    }
  }
  ok
}

fn emit_report<R: Serialize + HtmlRow>(
  report: &Report<R>,
  eff: &EffectiveConfig,
  cfg: &DigestConfig,
  engine: &Engine<'_>,
) -> Result<ExitCode> {
  for entry in &report.entries {
    info!(repo = %entry.repository, status = entry.status.label(), rows = entry.row_count(), "repository done");
  }
  info!(
    repos = report.entries.len(),
    rows = report.total_rows(),
    skipped = report.skipped.len(),
    "run complete"
  );

  if let Some(out) = json_target(eff) {
    util::write_json(&out, report)?;
  }
  if eff.html.is_none() && !eff.notify {
    return Ok(ExitCode::SUCCESS);
  }

  let links = if report.kind == model::ReportKind::Builds {
    engine.ci_links(&eff.request.selection)
  } else {
    Default::default()
  };
  let tz = cfg.timezone();
  let html = render::render_report(report, &RenderOptions { tz, ci_links: &links });
  let subject = cfg
    .notify
    .subject
    .clone()
    .unwrap_or_else(|| render::subject(report.kind, &report.window, tz));

  Ok(if deliver_html(eff, cfg, subject, html) {
    ExitCode::SUCCESS
  } else {
    ExitCode::from(EXIT_DELIVERY)
  })
}

fn run(cli: Cli) -> Result<ExitCode> {
  // Phase 1: configuration
  let path = config::config_path(cli.config.as_deref());
  let cfg = DigestConfig::load(&path)?;
  cfg.validate()?;
  let eff = normalize(&cli, &cfg)?;

  // Phase 2: collaborators
  let sources = build_sources(&eff, &cfg)?;
  let cancel = CancelToken::new();
  if let Some(secs) = eff.max_run_secs {
    cancel.cancel_after(Duration::from_secs(secs));
  }
  let engine = Engine::new(
    &cfg,
    sources,
    EngineOptions {
      concurrency: eff.concurrency,
      retries: eff.retries,
      sync_method: eff.sync_method,
      clock: Arc::new(SystemClock),
      cancel,
    },
  )?;
  let now = window::effective_now(eff.now);

  // Phase 3: aggregate and deliver
  match eff.kind {
    Kind::Prs => emit_report(&engine.pull_requests(&eff.request, now)?, &eff, &cfg, &engine),
    Kind::Builds => emit_report(&engine.builds(&eff.request, now)?, &eff, &cfg, &engine),
    Kind::Sync => emit_report(&engine.sync(&eff.request, now)?, &eff, &cfg, &engine),
    Kind::Repos => {
      if cfg.organization.is_empty() {
        return Err(ConfigError::Invalid("the repos listing needs a top-level `organization`".into()).into());
      }
      let listing = engine
        .org_listing(now)
        .with_context(|| format!("listing repositories of {}", cfg.organization))?;
      info!(org = %listing.organization, repos = listing.repositories.len(), "listing complete");

      if let Some(out) = json_target(&eff) {
        util::write_json(&out, &listing)?;
      }
      if eff.html.is_none() && !eff.notify {
        return Ok(ExitCode::SUCCESS);
      }
      let links = Default::default();
      let html = render::render_listing(&listing, &RenderOptions {
        tz: cfg.timezone(),
        ci_links: &links,
      });
      let subject = format!("{} repositories", listing.organization);
      Ok(if deliver_html(&eff, &cfg, subject, html) {
        ExitCode::SUCCESS
      } else {
        ExitCode::from(EXIT_DELIVERY)
      })
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  if cli.gen_man {
    return match util::render_man_page::<Cli>() {
      Ok(page) => {
        print!("{}", page);
        ExitCode::SUCCESS
      }
      Err(e) => {
        eprintln!("error: {:#}", e);
        ExitCode::from(EXIT_FATAL)
      }
    };
  }

  init_logging(&cli);

  match run(cli) {
    Ok(code) => code,
    Err(e) => {
      eprintln!("error: {:#}", e);
      ExitCode::from(EXIT_FATAL)
    }
  }
}
