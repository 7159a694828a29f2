//! Shared test utilities for integration tests
//!
//! Fixture repos, file helpers and a scripted `git apply` runner so the
//! fallback engines can be exercised without a real cascade success.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use anyhow::Result;
use stanpatch::core::git::{ApplyRunner, AttemptCapture, AttemptSpec};
use tempfile::TempDir;

/// Temp dir with a minimal git repository
pub fn setup_repo() -> Result<TempDir> {
    let temp = TempDir::new()?;
    let root = temp.path();

    // minimal git init to simulate typical usage
    for args in [
        &["init", "-q"][..],
        &["config", "user.name", "Test"][..],
        &["config", "user.email", "t@example.com"][..],
        &["config", "core.autocrlf", "false"][..],
    ] {
        std::process::Command::new("git").args(args).current_dir(root).output()?;
    }

    Ok(temp)
}

/// `git` on PATH; tests that need it skip otherwise
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

pub fn write_file(repo: &Path, rel: &str, body: &str) {
    let p = repo.join(rel);
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(p, body.as_bytes()).unwrap();
}

pub fn read_file(repo: &Path, rel: &str) -> String {
    fs::read_to_string(repo.join(rel)).unwrap()
}

/// Every attempt exits 1; records the labels it saw
#[derive(Default)]
pub struct FailingRunner {
    pub seen: RefCell<Vec<String>>,
}

impl ApplyRunner for FailingRunner {
    fn run(&self, attempt: &AttemptSpec, _patch: &str, _cwd: &Path) -> Result<AttemptCapture> {
        self.seen.borrow_mut().push(attempt.label.clone());
        Ok(AttemptCapture {
            label: attempt.label.clone(),
            exit_code: 1,
            stdout: String::new(),
            stderr: "error: patch failed: mocked\n".into(),
        })
    }
}
