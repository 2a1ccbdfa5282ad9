use predicates::prelude::*;

use crate::digest_cmd;

#[test]
fn missing_config_file_is_fatal() {
  let dir = test_support::tempdir();
  test_support::cmd_bin("repo-digest")
    .arg("--config")
    .arg(dir.path().join("absent.toml"))
    .assert()
    .code(1)
    .stderr(predicate::str::contains("error:").and(predicate::str::contains("absent.toml")));
}

#[test]
fn unknown_keys_are_rejected() {
  let dir = test_support::tempdir();
  let path = dir.path().join("digest.toml");
  std::fs::write(&path, "organization = \"acme\"\nlookback = 7\n[[repositories]]\nname = \"api\"\n").unwrap();

  test_support::cmd_bin("repo-digest")
    .arg("--config")
    .arg(&path)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("lookback"));
}

#[test]
fn invalid_flags_fail_before_any_fetch() {
  digest_cmd().args(["--days", "0"]).assert().code(1);
  digest_cmd().args(["--branch", "release*"]).assert().code(1);
  digest_cmd().args(["--repo", "nope"]).assert().code(1);
}

#[test]
fn missing_github_token_is_fatal() {
  // No fixtures and no `gh` on PATH, so credentials cannot be discovered.
  test_support::cmd_bin("repo-digest")
    .env("PATH", "")
    .arg("--config")
    .arg(test_support::fixture_path("digest.toml"))
    .args(["--kind", "prs"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn config_path_can_come_from_the_environment() {
  let out = test_support::cmd_bin("repo-digest")
    .env("DIGEST_CONFIG", test_support::fixture_path("digest.toml"))
    .env("DIGEST_TEST_FIXTURES", test_support::fixture_path("remote.json"))
    .args(["--kind", "repos", "--now-override", crate::NOW])
    .output()
    .unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
}
