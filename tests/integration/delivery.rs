use crate::NOW;

/// The fixture config with the notifier command swapped out.
fn config_with_notifier(dir: &std::path::Path, command: &str) -> std::path::PathBuf {
  let base = test_support::read_fixture_text("digest.toml");
  let body = base.replacen("[notify]\n", &format!("[notify]\ncommand = \"{}\"\n", command), 1);
  let path = dir.join("digest.toml");
  std::fs::write(&path, body).unwrap();
  path
}

fn run_with(config: &std::path::Path, extra: &[&str]) -> std::process::Output {
  test_support::cmd_bin("repo-digest")
    .env("DIGEST_TEST_FIXTURES", test_support::fixture_path("remote.json"))
    .arg("--config")
    .arg(config)
    .args(["--kind", "prs", "--now-override", NOW])
    .args(extra)
    .output()
    .unwrap()
}

#[test]
fn html_flag_writes_the_digest_only() {
  let dir = test_support::tempdir();
  let html = dir.path().join("out/digest.html");

  let out = test_support::cmd_bin("repo-digest")
    .env("DIGEST_TEST_FIXTURES", test_support::fixture_path("remote.json"))
    .arg("--config")
    .arg(test_support::fixture_path("digest.toml"))
    .args(["--kind", "prs", "--now-override", NOW, "--html"])
    .arg(&html)
    .output()
    .unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  assert!(out.stdout.is_empty());

  let page = std::fs::read_to_string(&html).unwrap();
  assert!(page.contains("<h1>Merged Pull Requests</h1>"));
  assert!(page.contains("Ada Lovelace"));
  assert!(page.contains("acme/web"));
}

#[test]
fn notify_pipes_a_mail_message_to_the_command() {
  let dir = test_support::tempdir();
  let sent = dir.path().join("sent.eml");
  let config = config_with_notifier(dir.path(), &format!("tee {}", sent.display()));

  let out = run_with(&config, &["--notify"]);
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

  let msg = std::fs::read_to_string(&sent).unwrap();
  assert!(msg.contains("To: team@acme.test\r\n"));
  assert!(msg.contains("Subject: Merged Pull Requests: 2025-08-08 to 2025-08-15\r\n"));
  assert!(msg.contains("Ada Lovelace"));
}

#[test]
fn failed_notification_exits_with_delivery_code() {
  let dir = test_support::tempdir();
  let config = config_with_notifier(dir.path(), "false");
  let html = dir.path().join("digest.html");

  let out = run_with(&config, &["--notify", "--html", html.to_str().unwrap()]);
  assert_eq!(out.status.code(), Some(2));
  // Other deliveries still happen.
  assert!(html.exists());
}
