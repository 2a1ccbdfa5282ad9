use crate::{digest_cmd, stdout_json};

#[test]
fn listing_keeps_prefixed_repositories_sorted() {
  let out = digest_cmd().args(["--kind", "repos"]).output().unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  let v = stdout_json(&out);

  assert_eq!(v["organization"], "acme");
  let names: Vec<&str> = v["repositories"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["OBP-API", "OBP-web"]);
  assert_eq!(v["repositories"][0]["default_branch"], "develop");

  // The nameless entry is reported, not silently dropped.
  assert_eq!(v["skipped"].as_array().unwrap().len(), 1);
}
