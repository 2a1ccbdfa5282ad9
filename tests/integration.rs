// Driver for end-to-end tests of the repo-digest binary under tests/integration/.
// Remote sources are served from tests/fixtures/remote.json via DIGEST_TEST_FIXTURES.
//
#[path = "integration/builds_report.rs"]
mod builds_report;
#[path = "integration/cli_gen_man.rs"]
mod cli_gen_man;
#[path = "integration/config_errors.rs"]
mod config_errors;
#[path = "integration/delivery.rs"]
mod delivery;
#[path = "integration/prs_report.rs"]
mod prs_report;
#[path = "integration/repos_listing.rs"]
mod repos_listing;
#[path = "integration/sync_report.rs"]
mod sync_report;

pub const NOW: &str = "2025-08-15T12:00:00Z";

/// The binary wired to the fixture config and canned remote responses.
pub fn digest_cmd() -> assert_cmd::Command {
  let mut cmd = test_support::cmd_bin("repo-digest");
  cmd
    .env("DIGEST_TEST_FIXTURES", test_support::fixture_path("remote.json"))
    .arg("--config")
    .arg(test_support::fixture_path("digest.toml"))
    .args(["--now-override", NOW]);
  cmd
}

pub fn stdout_json(out: &std::process::Output) -> serde_json::Value {
  serde_json::from_slice(&out.stdout).unwrap_or_else(|e| {
    panic!(
      "stdout is not JSON ({e}); stderr: {}",
      String::from_utf8_lossy(&out.stderr)
    )
  })
}

/// The group named `name` inside the entry for `repo`.
pub fn group<'a>(report: &'a serde_json::Value, repo: &str, name: &str) -> &'a serde_json::Value {
  let entry = report["entries"]
    .as_array()
    .unwrap()
    .iter()
    .find(|e| e["repository"]["name"] == repo)
    .unwrap_or_else(|| panic!("no entry for {repo}"));
  entry["groups"]
    .as_array()
    .unwrap()
    .iter()
    .find(|g| g["name"] == name)
    .unwrap_or_else(|| panic!("no group {name} in {repo}"))
}
