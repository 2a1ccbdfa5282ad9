use crate::{digest_cmd, group, stdout_json};

#[test]
fn builds_cover_literal_release_and_tag_jobs() {
  let out = digest_cmd().args(["--kind", "builds"]).output().unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  let v = stdout_json(&out);
  assert_eq!(v["kind"], "builds");

  let main = group(&v, "api", "main");
  let numbers: Vec<i64> = main["rows"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["number"].as_i64().unwrap())
    .collect();
  assert_eq!(numbers, vec![12, 11]);
  assert_eq!(main["rows"][0]["result"], "SUCCESS");
  assert_eq!(main["rows"][1]["result"], "FAILURE");

  // Job names come back unescaped.
  let release = group(&v, "api", "release/2.0");
  assert_eq!(release["rows"].as_array().unwrap().len(), 1);
  assert_eq!(release["rows"][0]["result"], "UNSTABLE");

  // Only prefixed tags dated inside the window become jobs.
  let tag = group(&v, "api", "v1.4.0");
  assert_eq!(tag["rows"][0]["result"], "UNKNOWN");
  let api = v["entries"].as_array().unwrap().iter().find(|e| e["repository"]["name"] == "api").unwrap();
  let names: Vec<&str> = api["groups"].as_array().unwrap().iter().map(|g| g["name"].as_str().unwrap()).collect();
  assert!(!names.contains(&"v2.0.0"));
  assert!(!names.iter().any(|n| n.starts_with("nightly")));

  // A build without a timestamp is skipped, not fatal.
  let skipped = v["skipped"].as_array().unwrap();
  assert_eq!(skipped.len(), 1);
  assert_eq!(skipped[0]["branch"], "release/2.0");

  assert_eq!(v["statuses"]["acme/api"]["status"], "populated");
  assert_eq!(v["statuses"]["acme/web"]["status"], "fetch-failed");
}

#[test]
fn branch_flag_overrides_configured_specs() {
  let out = digest_cmd()
    .args(["--kind", "builds", "--repo", "api", "--branch", "release/*"])
    .output()
    .unwrap();
  assert!(out.status.success());
  let v = stdout_json(&out);

  let groups = v["entries"][0]["groups"].as_array().unwrap();
  assert_eq!(groups.len(), 1);
  assert_eq!(groups[0]["name"], "release/2.0");
}
