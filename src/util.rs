// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Small shared helpers: git subprocess, short ids, JSON output, man page rendering
// role: utilities/helpers
// inputs: Repository paths and git args; serializable values; clap CommandFactory
// outputs: Command stdout, shortened ids, files on disk or stdout, man page text
// side_effects: run_git invokes subprocesses; write_json creates parent directories
// errors: run_git surfaces command + stderr; IO errors bubble with context
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use clap::CommandFactory;
use serde::Serialize;

pub fn run_git(repo: &str, args: &[String]) -> Result<String> {
  let out = Command::new("git")
    .args(args)
    .current_dir(repo)
    .output()
    .with_context(|| format!("spawning git {:?}", args))?;

  if out.status.success() {
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
  } else {
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::bail!("git {:?} failed: {}", args, stderr.trim())
  }
}

/// Generates a short 12-character SHA from a full one.
pub fn short_sha(full: &str) -> String {
  full.chars().take(12).collect()
}

/// Pretty JSON to stdout when `out` is "-", otherwise to that file (parents created).
pub fn write_json<T: Serialize>(out: &str, value: &T) -> Result<()> {
  let body = serde_json::to_string_pretty(value)?;
  if out == "-" {
    println!("{}", body);
    return Ok(());
  }

  let path = Path::new(out);
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
  }
  std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

/// Render a section-1 man page for a clap `CommandFactory` implementor.
pub fn render_man_page<T: CommandFactory>() -> Result<String> {
  let cmd = T::command();
  let man = clap_mangen::Man::new(cmd);
  let mut buf: Vec<u8> = Vec::new();

  man.render(&mut buf)?;

  Ok(String::from_utf8_lossy(&buf).to_string())
}
