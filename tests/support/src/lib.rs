//! test-support: shared helpers for repo-digest tests.
//!
//! Added as a dev-dependency in the top-level `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test_support = { path = "tests/support", features = ["serde"] }
//! ```
//!
//! Then in tests:
//! ```rust
//! use test_support::{init_tracing, fixtures_dir};
//!
//! #[test]
//! fn example() {
//!     init_tracing();
//!     let _root = fixtures_dir();
//! }
//! ```

use once_cell::sync::Lazy;
use tracing_subscriber::{fmt, EnvFilter};

use std::process::Command;
use std::{
    env,
    path::{Path, PathBuf},
};

/// Initialize `tracing` once, honoring `RUST_LOG` and writing via the test writer.
///
/// Safe to call from multiple tests; only the first call configures the global subscriber.
pub fn init_tracing() {
    static INIT: Lazy<()> = Lazy::new(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("warn,repo_digest=info"))
            .unwrap();
        // with_test_writer() causes logs to appear alongside failing tests only
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
    Lazy::force(&INIT);
}

/// Initialize insta snapshot settings once per test process.
///
/// Omits `Expression:` in snapshot headers for cleaner diffs.
pub fn init_insta() {
    static INIT: Lazy<()> = Lazy::new(|| {
        let mut settings = insta::Settings::clone_current();
        settings.set_omit_expression(true);
        // Bind settings to the thread for the remainder of the test process by leaking the guard
        let guard = settings.bind_to_scope();
        std::mem::forget(guard);
    });
    Lazy::force(&INIT);
}

/// Return the path to the top-level `tests/fixtures` directory.
///
/// This crate lives at `<repo>/tests/support`, so the fixtures sit one level up.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("tests"))
        .join("fixtures")
}

/// Absolute path of a fixture file.
pub fn fixture_path<P: AsRef<Path>>(rel_path: P) -> PathBuf {
    fixtures_dir().join(rel_path)
}

/// Read a UTF-8 text fixture into a string.
pub fn read_fixture_text<P: AsRef<Path>>(rel_path: P) -> String {
    let path = fixtures_dir().join(rel_path);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
}

/// Deserialize a JSON fixture into `T` (enable `serde` feature).
#[cfg(feature = "serde")]
pub fn read_fixture_json<T, P>(rel_path: P) -> T
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = fixtures_dir().join(rel_path);
    let file = std::fs::File::open(&path)
        .unwrap_or_else(|e| panic!("failed to open fixture {}: {e}", path.display()));
    serde_json::from_reader::<_, T>(file)
        .unwrap_or_else(|e| panic!("failed to parse JSON fixture {}: {e}", path.display()))
}

/// Create a temp directory that deletes on drop.
pub fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create tempdir")
}

/// Set multiple environment variables for the duration of the returned guard.
pub fn with_env(vars: &[(&str, &str)]) -> EnvGuard {
    EnvGuard::set_many(vars)
}

/// Run a binary target with `assert_cmd`, returning the ready-to-run `Command`.
///
/// The command starts with a clean credential environment so a developer's
/// real tokens never reach a test run.
pub fn cmd_bin(bin: &str) -> assert_cmd::Command {
    init_tracing();
    let mut cmd = assert_cmd::Command::cargo_bin(bin).expect("binary target not found");
    for var in [
        "GITHUB_TOKEN",
        "GH_TOKEN",
        "JENKINS_USER",
        "JENKINS_API_TOKEN",
        "DIGEST_CONFIG",
        "DIGEST_TEST_FIXTURES",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Guard for temporarily setting environment variables.
pub struct EnvGuard {
    prev: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub fn set_many(kv: &[(&str, &str)]) -> Self {
        let mut prev = Vec::with_capacity(kv.len());
        for (k, v) in kv {
            prev.push((k.to_string(), env::var(k).ok()));
            env::set_var(k, v);
        }
        Self { prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (k, old) in self.prev.drain(..) {
            match old {
                Some(v) => env::set_var(&k, v),
                None => env::remove_var(&k),
            }
        }
    }
}

// --- git fixtures ---

pub fn run(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(repo)
        .env("GIT_AUTHOR_DATE", "2025-08-12T14:03:00")
        .env("GIT_COMMITTER_DATE", "2025-08-12T14:03:00")
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

pub fn git_output(repo: &Path, args: &[&str]) -> String {
    let out = Command::new("git").args(args).current_dir(repo).output().unwrap();
    assert!(out.status.success(), "git {:?} failed", args);
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Write `files`, stage everything and commit with a fixed date.
pub fn commit_files(repo: &Path, files: &[(&str, &str)], message: &str, date: &str) -> String {
    for (rel, body) in files {
        let path = repo.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }
    run(repo, &["add", "."]);

    let status = Command::new("git")
        .args(["commit", "-q", "-m", message])
        .current_dir(repo)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .status()
        .unwrap();
    assert!(status.success(), "git commit failed");

    git_output(repo, &["rev-parse", "HEAD"])
}

pub fn init_empty_repo() -> tempfile::TempDir {
    let dir = tempdir();
    run(dir.path(), &["init", "-q", "-b", "main"]);
    run(dir.path(), &["config", "user.name", "Fixture Bot"]);
    run(dir.path(), &["config", "user.email", "fixture@example.com"]);
    run(dir.path(), &["config", "commit.gpgsign", "false"]);
    dir
}

/// A small repository for branch sync checks:
///
/// - `main`: add user model, then add payment service
/// - `develop/synced`: from the first commit, an extra change, then a cherry-pick of the payment service
/// - `develop/behind`: from the first commit, an unrelated change only
pub fn init_fixture_repo() -> tempfile::TempDir {
    let dir = init_empty_repo();
    let root = dir.path();

    let base = commit_files(
        root,
        &[("app/models/user.rb", "class User; end\n")],
        "feat: add user model",
        "2025-08-12T14:03:00",
    );
    let payment = commit_files(
        root,
        &[("app/services/payment_service.rb", "class PaymentService; end\n")],
        "feat: add payment service",
        "2025-08-13T09:12:00",
    );

    run(root, &["checkout", "-q", "-b", "develop/synced", &base]);
    commit_files(
        root,
        &[("docs/README.md", "# Docs\n")],
        "docs: add readme",
        "2025-08-13T10:00:00",
    );
    run(root, &["cherry-pick", &payment]);

    run(root, &["checkout", "-q", "-b", "develop/behind", &base]);
    commit_files(
        root,
        &[("config/app.yml", "name: app\n")],
        "chore: add config",
        "2025-08-13T11:00:00",
    );

    run(root, &["checkout", "-q", "main"]);
    dir
}
