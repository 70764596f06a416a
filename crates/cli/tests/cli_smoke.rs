//! CLI smoke tests for fleetsync.
//!
//! These tests run the offline commands end to end and check argument validation
//! of the long-running ones.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn fleetsync_cmd() -> Command {
  cargo_bin_cmd!("fleetsync")
}

/// sha256 of the bytes `hello`.
const HELLO_DIGEST: &str = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn temp_file(name: &str, content: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join(name), content).unwrap();
  temp
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  fleetsync_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  fleetsync_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("fleetsync"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["serve", "agent", "digest", "bundle"] {
    fleetsync_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// digest
// =============================================================================

#[test]
fn digest_prints_sha256_per_file() {
  let temp = temp_file("a.yaml", "hello");
  let path = temp.path().join("a.yaml");

  fleetsync_cmd()
    .arg("digest")
    .arg(&path)
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("{HELLO_DIGEST}  {}", path.display())));
}

#[test]
fn digest_missing_file_fails() {
  fleetsync_cmd()
    .arg("digest")
    .arg("/nonexistent/a.yaml")
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to read"));
}

// =============================================================================
// bundle
// =============================================================================

#[test]
fn bundle_pack_then_list() {
  let temp = temp_file("a.yaml", "hello");
  std::fs::write(temp.path().join("b.yaml"), "other").unwrap();
  let archive = temp.path().join("bundle.tar.gz");

  fleetsync_cmd()
    .args(["bundle", "pack"])
    .arg(temp.path().join("a.yaml"))
    .arg(temp.path().join("b.yaml"))
    .arg("--output")
    .arg(&archive)
    .assert()
    .success()
    .stdout(predicate::str::contains("Packed 2 file(s)"));

  fleetsync_cmd()
    .args(["bundle", "list"])
    .arg(&archive)
    .args(["--expect", HELLO_DIGEST])
    .assert()
    .success()
    .stdout(predicate::str::contains(HELLO_DIGEST).and(predicate::str::contains("5 B")));
}

#[test]
fn bundle_pack_is_deterministic() {
  let temp = temp_file("a.yaml", "hello");
  let pack = |output: &str| {
    fleetsync_cmd()
      .args(["bundle", "pack"])
      .arg(temp.path().join("a.yaml"))
      .arg("--output")
      .arg(temp.path().join(output))
      .assert()
      .success();
    std::fs::read(temp.path().join(output)).unwrap()
  };

  assert_eq!(pack("one.tar.gz"), pack("two.tar.gz"));
}

#[test]
fn bundle_list_rejects_unsupported_digest() {
  let temp = temp_file("a.yaml", "hello");
  let archive = temp.path().join("bundle.tar.gz");
  fleetsync_cmd()
    .args(["bundle", "pack"])
    .arg(temp.path().join("a.yaml"))
    .arg("--output")
    .arg(&archive)
    .assert()
    .success();

  fleetsync_cmd()
    .args(["bundle", "list"])
    .arg(&archive)
    .args(["--expect", "md5:deadbeef"])
    .assert()
    .failure();
}

// =============================================================================
// agent
// =============================================================================

#[test]
fn agent_requires_device_id() {
  fleetsync_cmd()
    .arg("agent")
    .env_remove("FLEETSYNC_DEVICE_ID")
    .assert()
    .failure()
    .stderr(predicate::str::contains("--device-id"));
}

#[test]
fn agent_rejects_base_url_without_scheme() {
  fleetsync_cmd()
    .args(["agent", "--once", "--device-id", "device1", "--base-url", "localhost:8080"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("base url must start with"));
}

#[test]
fn agent_once_fails_when_server_unreachable() {
  fleetsync_cmd()
    .args([
      "agent",
      "--once",
      "--device-id",
      "device1",
      "--base-url",
      "http://127.0.0.1:9",
      "--timeout",
      "2s",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("poll failed"));
}

#[test]
fn agent_rejects_bad_duration() {
  fleetsync_cmd()
    .args(["agent", "--device-id", "device1", "--poll-interval", "soon"])
    .assert()
    .failure();
}
