//! Cascade against a real `git` binary. Skipped when git is not installed.

mod util;

use std::path::Path;

use stanpatch::core::{
    git::GitApplyRunner,
    pipeline::{PipelineOptions, apply_patch_pipeline},
};
use util::{git_available, read_file, setup_repo, write_file};

fn git(root: &Path, args: &[&str]) {
    std::process::Command::new("git").args(args).current_dir(root).output().unwrap();
}

fn commit_all(root: &Path) {
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "fixture"]);
}

fn opts(root: &Path, check: bool) -> PipelineOptions {
    PipelineOptions {
        repo_root: root.to_path_buf(),
        stan_path: ".stan".into(),
        check,
        sandbox_root: None,
    }
}

const DIFF: &str = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@
 one
-two
+TWO
 three
";

#[test]
fn clean_diff_applies_through_git() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }
    let repo = setup_repo().unwrap();
    write_file(repo.path(), "a.txt", "one\ntwo\nthree\n");
    commit_all(repo.path());

    let out = apply_patch_pipeline(DIFF, &GitApplyRunner::default(), &opts(repo.path(), false));

    assert!(out.ok);
    assert!(out.js.is_none());
    assert_eq!(out.result.last_code, 0);
    assert!(out.result.tried.iter().all(|l| l.ends_with("-p1")));
    assert_eq!(read_file(repo.path(), "a.txt"), "one\nTWO\nthree\n");
}

#[test]
fn check_mode_leaves_worktree_alone() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }
    let repo = setup_repo().unwrap();
    write_file(repo.path(), "a.txt", "one\ntwo\nthree\n");
    commit_all(repo.path());

    let out = apply_patch_pipeline(DIFF, &GitApplyRunner::default(), &opts(repo.path(), true));

    assert!(out.ok);
    assert_eq!(read_file(repo.path(), "a.txt"), "one\ntwo\nthree\n");
}

#[test]
fn prefixless_diff_falls_through_to_strip_zero() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }
    let repo = setup_repo().unwrap();
    write_file(repo.path(), "a.txt", "one\ntwo\nthree\n");
    commit_all(repo.path());
    let diff = "--- a.txt\n+++ a.txt\n@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n";

    let out = apply_patch_pipeline(diff, &GitApplyRunner::default(), &opts(repo.path(), false));

    assert!(out.ok);
    assert!(out.result.tried.iter().take(4).all(|l| l.ends_with("-p1")));
    assert!(out.result.tried.last().unwrap().ends_with("-p0"));
    assert_eq!(read_file(repo.path(), "a.txt"), "one\nTWO\nthree\n");
}

#[test]
fn markdown_drift_is_rescued_in_process() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }
    let repo = setup_repo().unwrap();
    write_file(repo.path(), "README.md", "# Title\n\nThe prose was reflowed.\nEnd.\n");
    commit_all(repo.path());
    let diff = "\
--- a/README.md
+++ b/README.md
@@ -1,4 +1,4 @@
 # Title

 The prose, before reflow.
-End.
+Fin.
";

    let out = apply_patch_pipeline(diff, &GitApplyRunner::default(), &opts(repo.path(), false));

    assert!(out.ok, "{:?}", out.result.captures);
    assert_eq!(out.result.captures.len(), 8);
    assert_eq!(out.js.unwrap().ok_files, vec!["README.md"]);
    assert_eq!(read_file(repo.path(), "README.md"), "# Title\n\nThe prose was reflowed.\nFin.\n");
}

#[test]
fn imports_stay_untouched_whatever_the_header_prefix() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }
    let repo = setup_repo().unwrap();
    write_file(repo.path(), ".stan/imports/lib.ts", "secret\n");
    commit_all(repo.path());
    let diff = "\
--- x/.stan/imports/lib.ts
+++ y/.stan/imports/lib.ts
@@ -1 +1 @@
-secret
+changed
";

    let out = apply_patch_pipeline(diff, &GitApplyRunner::default(), &opts(repo.path(), false));

    assert!(!out.ok);
    assert!(out.result.tried.is_empty());
    assert_eq!(out.js_failures()[0].path.to_string(), ".stan/imports/lib.ts");
    assert_eq!(read_file(repo.path(), ".stan/imports/lib.ts"), "secret\n");
}
