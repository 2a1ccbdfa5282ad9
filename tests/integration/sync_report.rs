use crate::{group, NOW};

fn mirror_config(dir: &std::path::Path, mirror: &std::path::Path) -> std::path::PathBuf {
  let path = dir.join("digest.toml");
  let body = format!(
    "organization = \"acme\"\n\n[[repositories]]\nname = \"app\"\nsync_branches = [\"develop/*\"]\nmirror = \"{}\"\n",
    mirror.display()
  );
  std::fs::write(&path, body).unwrap();
  path
}

#[test]
fn sync_verdicts_from_a_local_mirror() {
  let repo = test_support::init_fixture_repo();
  let dir = test_support::tempdir();
  let config = mirror_config(dir.path(), repo.path());

  let out = test_support::cmd_bin("repo-digest")
    .arg("--config")
    .arg(&config)
    .args(["--kind", "sync", "--now-override", NOW])
    .output()
    .unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  let v = crate::stdout_json(&out);
  assert_eq!(v["kind"], "sync");

  // The cherry-picked change counts as present; the unrelated branch is behind.
  let synced = group(&v, "app", "develop/synced");
  assert_eq!(synced["rows"][0]["synced"], true);
  assert_eq!(synced["rows"][0]["baseline_commits"], 2);

  let behind = group(&v, "app", "develop/behind");
  assert_eq!(behind["rows"][0]["synced"], false);
  assert_eq!(v["statuses"]["acme/app"]["status"], "populated");
}

#[test]
fn sync_html_digest_lists_each_candidate() {
  let repo = test_support::init_fixture_repo();
  let dir = test_support::tempdir();
  let config = mirror_config(dir.path(), repo.path());
  let html = dir.path().join("sync.html");

  let out = test_support::cmd_bin("repo-digest")
    .arg("--config")
    .arg(&config)
    .args(["--kind", "sync", "--now-override", NOW, "--html"])
    .arg(&html)
    .output()
    .unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

  let page = std::fs::read_to_string(&html).unwrap();
  assert!(page.contains("Branch Sync Report"));
  assert!(page.contains("develop/synced"));
  assert!(page.contains("develop/behind"));
}
