//! Binary-level tests: exit codes, printed envelopes, JSON and init.

use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use assert_cmd::Command;

/// `stanpatch patch` rooted at `dir`, clipboard disabled
fn patch_cmd(dir: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stanpatch").expect("stanpatch binary");
    cmd.current_dir(dir.path())
        .env_remove("STANPATCH_LOG")
        .env("STANPATCH_PATCH__CLIPBOARD", "false")
        .args(["patch", "--no-clipboard", "--repo-root"])
        .arg(dir.path());
    cmd
}

const DIFF: &str = "```diff\n--- a/a.txt\n+++ b/a.txt\n@@ -1,2 +1,2 @@\n-old\n+new\n line2\n```\n";

#[test]
fn applies_diff_from_stdin_and_persists_raw() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("a.txt").write_str("old\nline2\n").unwrap();

    patch_cmd(&dir)
        .write_stdin(DIFF)
        .assert()
        .success()
        .stdout(predicate::str::contains("Patch applied"));

    dir.child("a.txt").assert("new\nline2\n");
    dir.child(".stan/patch/.patch").assert(DIFF);
}

#[test]
fn check_mode_does_not_modify() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("a.txt").write_str("old\nline2\n").unwrap();

    patch_cmd(&dir).arg("--check").write_stdin(DIFF).assert().success();

    dir.child("a.txt").assert("old\nline2\n");
}

#[test]
fn unplaceable_diff_prints_envelope_and_exits_2() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("a.txt").write_str("line1\n").unwrap();

    patch_cmd(&dir)
        .arg("--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-NOPE\n+x\n")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("The unified diff patch for file a.txt was invalid."))
        .stdout(predicate::str::contains("START PATCH DIAGNOSTICS"))
        .stdout(predicate::str::contains("jsdiff: a.txt: unable to place hunk(s)"))
        .stderr(predicate::str::contains("patch failed"));

    dir.child("a.txt").assert("line1\n");
}

#[test]
fn garbage_is_invalid_input() {
    let dir = assert_fs::TempDir::new().unwrap();

    patch_cmd(&dir)
        .arg("just some chat reply, no patch here")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("jsdiff: (patch): invalid unified diff"));
}

#[test]
fn file_ops_json_report() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("tmp.txt").write_str("x").unwrap();

    let assert = patch_cmd(&dir)
        .args(["--json", "### File Ops\nmkdirp build/out\nrm tmp.txt\n"])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let v: Value = serde_json::from_str(stdout.trim()).expect("valid json");
    assert_eq!(v["kind"], "file-ops");
    assert_eq!(v["ok"], true);
    assert_eq!(v["file_ops"]["results"].as_array().unwrap().len(), 2);
    assert_eq!(v["file_ops"]["results"][1]["verb"], "rm");

    dir.child("tmp.txt").assert(predicate::path::missing());
    dir.child("build/out").assert(predicate::path::is_dir());
}

#[test]
fn json_failures_carry_their_kind() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("a.txt").write_str("line1\n").unwrap();

    let json_of = |payload: &str| -> Value {
        let assert = patch_cmd(&dir).args(["--json", payload]).assert().code(2);
        let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
        let first = stdout.lines().next().unwrap_or_default().to_string();
        serde_json::from_str(&first).expect("valid json")
    };

    let parse = json_of("### File Ops\nzap a.txt\n");
    assert_eq!(parse["failure"], "file-ops-parse-error");

    let exec = json_of("### File Ops\nrm missing.txt\n");
    assert_eq!(exec["failure"], "file-ops-exec-error");
    assert_eq!(exec["file_ops"]["results"][0]["kind"], "file-ops-exec-error");

    let diff = json_of("--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-NOPE\n+x\n");
    assert_eq!(diff["failure"], "placement-failure");
    assert_eq!(diff["pipeline"]["js"]["failed"][0]["kind"], "placement-failure");
    assert_eq!(diff["pipeline"]["js"]["failed"][0]["reason"], "unable to place hunk(s)");
}

#[test]
fn file_ops_into_imports_fail_without_executing() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("a.txt").write_str("a").unwrap();

    patch_cmd(&dir)
        .arg("### File Ops\nmv a.txt .stan/imports/a.txt\n")
        .assert()
        .code(2)
        .stdout(predicate::str::starts_with("The File Ops patch failed."))
        .stdout(predicate::str::contains("path targets protected imports area"));

    dir.child("a.txt").assert("a");
}

#[test]
fn custom_stan_path_moves_the_patch_store() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("a.txt").write_str("old\nline2\n").unwrap();

    patch_cmd(&dir)
        .args(["--stan-path", "work"])
        .write_stdin(DIFF)
        .assert()
        .success();

    dir.child("work/patch/.patch").assert(predicate::path::exists());
    dir.child(".stan").assert(predicate::path::missing());
}

#[test]
fn init_writes_default_config() {
    let dir = assert_fs::TempDir::new().unwrap();

    Command::cargo_bin("stanpatch")
        .unwrap()
        .args(["init"])
        .arg(dir.path())
        .assert()
        .success();

    dir.child("stanpatch.toml")
        .assert(predicate::str::contains("stan_path = \".stan\""));

    Command::cargo_bin("stanpatch")
        .unwrap()
        .args(["init"])
        .arg(dir.path())
        .assert()
        .failure();
}

#[test]
fn completions_to_stdout() {
    Command::cargo_bin("stanpatch")
        .unwrap()
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stanpatch"));
}
