use crate::{digest_cmd, group, stdout_json};

#[test]
fn merged_pull_requests_per_repository() {
  let out = digest_cmd().args(["--kind", "prs"]).output().unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  let v = stdout_json(&out);

  assert_eq!(v["kind"], "prs");
  assert_eq!(v["baseline"], "main");
  let repos: Vec<&str> = v["entries"]
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["repository"]["name"].as_str().unwrap())
    .collect();
  assert_eq!(repos, vec!["api", "web"]);

  // Unmerged, pre-window and malformed pulls are all left out.
  let main = group(&v, "api", "main");
  let rows = main["rows"].as_array().unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["number"], 42);
  assert_eq!(rows[0]["author"], "Ada Lovelace");
  assert_eq!(rows[0]["author_login"], "ada");

  assert_eq!(v["statuses"]["acme/api"]["status"], "populated");
  assert_eq!(v["statuses"]["acme/web"]["status"], "branch-not-found");

  let skipped = v["skipped"].as_array().unwrap();
  assert_eq!(skipped.len(), 1);
  assert_eq!(skipped[0]["repository"]["name"], "api");
}

#[test]
fn repo_flag_limits_the_run() {
  let out = digest_cmd().args(["--kind", "prs", "--repo", "acme/web"]).output().unwrap();
  assert!(out.status.success());
  let v = stdout_json(&out);

  assert_eq!(v["entries"].as_array().unwrap().len(), 1);
  assert_eq!(v["entries"][0]["status"]["status"], "branch-not-found");
  assert_eq!(group(&v, "web", "main")["status"]["status"], "branch-not-found");
}

#[test]
fn out_flag_writes_json_to_a_file() {
  let dir = test_support::tempdir();
  let target = dir.path().join("reports/prs.json");

  let out = digest_cmd()
    .args(["--kind", "prs", "--out"])
    .arg(&target)
    .output()
    .unwrap();
  assert!(out.status.success());
  assert!(out.stdout.is_empty());

  let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
  assert_eq!(v["window"]["days"], 7);
}
