// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Content-derived commit fingerprints that survive rebases and cherry-picks
// role: compare/fingerprint
// inputs: CommitDiff (parent count plus per-file patch bodies or blob ids)
// outputs: Hex SHA-256 fingerprint, None for merges and empty commits, Data error for unparseable bodies
// invariants:
// - Commit id, parents, dates and message never contribute
// - Whitespace and hunk line numbers are ignored; +/-/context markers are kept
// - File order does not matter (per-file digests are sorted before the final hash)
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use sha2::{Digest, Sha256};

use crate::error::FetchError;
use crate::sources::{CommitDiff, FileChange};

fn normalized_body(file: &FileChange) -> Result<String, FetchError> {
  let mut body = String::new();

  for line in file.patch.as_deref().unwrap_or("").lines() {
    if line.starts_with("@@") || line.starts_with('\\') {
      continue;
    }
    let (marker, rest) = match line.chars().next() {
      Some(m @ ('+' | '-' | ' ')) => (m, &line[1..]),
      None => (' ', ""),
      Some(_) => {
        return Err(FetchError::Data(format!(
          "unparseable patch line in {}: `{}`",
          file.path, line
        )))
      }
    };
    body.push(marker);
    body.extend(rest.chars().filter(|c| !c.is_whitespace()));
    body.push('\n');
  }

  Ok(body)
}

fn file_digest(file: &FileChange) -> Result<String, FetchError> {
  let mut h = Sha256::new();
  h.update(file.path.as_bytes());
  h.update([0u8]);

  if file.binary {
    h.update(b"binary:");
    h.update(file.blob.as_deref().unwrap_or("").as_bytes());
  } else {
    h.update(normalized_body(file)?.as_bytes());
  }

  Ok(hex::encode(h.finalize()))
}

/// Fingerprint of a commit's change content.
///
/// `Ok(None)` for merge commits and commits that touch no files; those are
/// excluded from patch-identity sets on both sides.
pub fn fingerprint(diff: &CommitDiff) -> Result<Option<String>, FetchError> {
  if diff.parents > 1 || diff.files.is_empty() {
    return Ok(None);
  }

  let mut digests = diff.files.iter().map(file_digest).collect::<Result<Vec<_>, _>>()?;
  digests.sort();

  let mut h = Sha256::new();
  for d in &digests {
    h.update(d.as_bytes());
    h.update(b"\n");
  }
  Ok(Some(hex::encode(h.finalize())))
}
