//! Git apply cascade
//!
//! Drives `git apply` through a fixed, ordered list of strategy attempts
//! (3-way/2-way x nowarn/ignore-whitespace, strip level 1 then 0) and stops
//! at the first exit code 0. Every attempt's output is captured so a failed
//! cascade still leaves a complete diagnostic trail.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Strip levels tried by the cascade, in order
pub const STRIP_ORDER: [u8; 2] = [1, 0];

/// One concrete invocation of the apply tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptSpec {
    /// Arguments after the executable (`apply ...`)
    pub args: Vec<String>,
    pub strip: u8,
    pub label: String,
}

/// Captured result of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptCapture {
    pub label: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl AttemptCapture {
    /// First non-blank stderr line, trimmed
    pub fn first_stderr_line(&self) -> Option<&str> {
        self.stderr.lines().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Outcome of a whole cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub ok: bool,
    /// Labels of attempts actually executed
    pub tried: Vec<String>,
    /// Exit code of the last executed attempt (-1 if none ran)
    pub last_code: i32,
    pub captures: Vec<AttemptCapture>,
}

impl ApplyResult {
    /// Result for a cascade that never ran (policy refusal)
    pub fn not_run() -> Self {
        Self { ok: false, tried: Vec::new(), last_code: -1, captures: Vec::new() }
    }
}

/// Whitespace handling per attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Whitespace {
    /// `--whitespace=nowarn`
    Nowarn,
    /// `--ignore-whitespace`
    Ignore,
}

/// Build the four attempts for one strip level.
///
/// Order: 3way+nowarn, 3way+ignore, 2way+nowarn, 2way+ignore. `check`
/// adds `--check`; otherwise `stage` adds `--index`.
pub fn build_apply_attempts(check: bool, strip: u8, stage: bool) -> Vec<AttemptSpec> {
    let variants = [
        (true, Whitespace::Nowarn),
        (true, Whitespace::Ignore),
        (false, Whitespace::Nowarn),
        (false, Whitespace::Ignore),
    ];

    variants
        .iter()
        .map(|&(three_way, ws)| {
            let mut args = vec!["apply".to_string()];
            if three_way {
                args.push("--3way".into());
            }
            args.push(
                match ws {
                    Whitespace::Nowarn => "--whitespace=nowarn",
                    Whitespace::Ignore => "--ignore-whitespace",
                }
                .into(),
            );
            args.push("--recount".into());
            args.push("--inaccurate-eof".into());
            if check {
                args.push("--check".into());
            } else if stage {
                args.push("--index".into());
            }
            args.push(format!("-p{strip}"));

            let label = format!(
                "{}-{}-p{strip}",
                if three_way { "3way" } else { "2way" },
                match ws {
                    Whitespace::Nowarn => "nowarn",
                    Whitespace::Ignore => "ignore",
                }
            );
            AttemptSpec { args, strip, label }
        })
        .collect()
}

/// All cascade attempts: p1 exhausted before p0 (eight in total)
pub fn cascade_attempts(check: bool) -> Vec<AttemptSpec> {
    STRIP_ORDER
        .iter()
        .flat_map(|&strip| build_apply_attempts(check, strip, false))
        .collect()
}

/// Executes one attempt; the seam that lets tests script the cascade
pub trait ApplyRunner {
    fn run(
        &self,
        attempt: &AttemptSpec,
        patch: &str,
        cwd: &Path,
    ) -> Result<AttemptCapture>;
}

/// Runs the real `git` executable, feeding the patch on stdin
#[derive(Debug, Clone)]
pub struct GitApplyRunner {
    git_executable: PathBuf,
}

impl Default for GitApplyRunner {
    fn default() -> Self {
        Self { git_executable: PathBuf::from("git") }
    }
}

impl GitApplyRunner {
    pub fn new(git_executable: impl Into<PathBuf>) -> Self {
        Self { git_executable: git_executable.into() }
    }
}

impl ApplyRunner for GitApplyRunner {
    fn run(&self, attempt: &AttemptSpec, patch: &str, cwd: &Path) -> Result<AttemptCapture> {
        let mut cmd = Command::new(&self.git_executable);
        cmd.current_dir(cwd)
            .args(&attempt.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to spawn git apply process")?;

        // Write patch content to stdin, then close it so git sees EOF.
        // git may exit before reading (bad flags, not a repo); its stderr
        // is still worth capturing, so a broken pipe is not fatal here.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(patch.as_bytes()) {
                debug!(error = %e, label = %attempt.label, "git apply closed stdin early");
            }
        }

        let output = child
            .wait_with_output()
            .context("Failed to wait for git apply process")?;

        Ok(AttemptCapture {
            label: attempt.label.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run attempts sequentially, returning at the first exit code 0.
///
/// A runner error (spawn failure, broken pipe) is recorded as exit code -1
/// with the error text as stderr, and the cascade moves on.
pub fn run_attempts(
    runner: &dyn ApplyRunner,
    attempts: &[AttemptSpec],
    patch: &str,
    cwd: &Path,
) -> ApplyResult {
    let mut result = ApplyResult::not_run();

    for attempt in attempts {
        let capture = runner.run(attempt, patch, cwd).unwrap_or_else(|e| AttemptCapture {
            label: attempt.label.clone(),
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("{e:#}"),
        });
        debug!(label = %capture.label, code = capture.exit_code, "git apply attempt");

        result.tried.push(capture.label.clone());
        result.last_code = capture.exit_code;
        let ok = capture.exit_code == 0;
        result.captures.push(capture);

        if ok {
            info!(label = %attempt.label, "git apply succeeded");
            result.ok = true;
            break;
        }
    }

    result
}

/// The full eight-attempt cascade against the worktree
pub fn run_apply_cascade(runner: &dyn ApplyRunner, patch: &str, cwd: &Path, check: bool) -> ApplyResult {
    run_attempts(runner, &cascade_attempts(check), patch, cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Succeeds on the attempt with the given label, fails otherwise
    struct Scripted {
        succeed_on: Option<&'static str>,
        seen: RefCell<Vec<String>>,
    }

    impl ApplyRunner for Scripted {
        fn run(&self, attempt: &AttemptSpec, _patch: &str, _cwd: &Path) -> Result<AttemptCapture> {
            self.seen.borrow_mut().push(attempt.label.clone());
            let ok = self.succeed_on == Some(attempt.label.as_str());
            Ok(AttemptCapture {
                label: attempt.label.clone(),
                exit_code: if ok { 0 } else { 1 },
                stdout: String::new(),
                stderr: if ok { String::new() } else { "\nerror: patch failed: a.txt:1\n".into() },
            })
        }
    }

    #[test]
    fn attempt_order_is_fixed() {
        let labels: Vec<String> = cascade_attempts(false).into_iter().map(|a| a.label).collect();
        assert_eq!(
            labels,
            vec![
                "3way-nowarn-p1",
                "3way-ignore-p1",
                "2way-nowarn-p1",
                "2way-ignore-p1",
                "3way-nowarn-p0",
                "3way-ignore-p0",
                "2way-nowarn-p0",
                "2way-ignore-p0",
            ]
        );
    }

    #[test]
    fn attempt_args() {
        let a = build_apply_attempts(true, 1, true);
        assert_eq!(
            a[0].args,
            vec!["apply", "--3way", "--whitespace=nowarn", "--recount", "--inaccurate-eof", "--check", "-p1"]
        );
        assert_eq!(
            a[3].args,
            vec!["apply", "--ignore-whitespace", "--recount", "--inaccurate-eof", "--check", "-p1"]
        );

        let staged = build_apply_attempts(false, 0, true);
        assert!(staged.iter().all(|s| s.args.contains(&"--index".to_string())));
        let plain = build_apply_attempts(false, 0, false);
        assert!(plain.iter().all(|s| !s.args.iter().any(|x| x == "--index" || x == "--check")));
        assert!(plain.iter().all(|s| s.strip == 0 && s.args.last().unwrap() == "-p0"));
    }

    #[test]
    fn first_success_wins() {
        let runner = Scripted { succeed_on: Some("2way-nowarn-p1"), seen: RefCell::new(vec![]) };
        let res = run_apply_cascade(&runner, "patch", Path::new("."), false);
        assert!(res.ok);
        assert_eq!(res.tried.len(), 3);
        assert_eq!(res.captures.len(), 3);
        assert_eq!(res.last_code, 0);
        assert_eq!(runner.seen.borrow().len(), 3);
    }

    #[test]
    fn exhausted_cascade_keeps_every_capture() {
        let runner = Scripted { succeed_on: None, seen: RefCell::new(vec![]) };
        let res = run_apply_cascade(&runner, "patch", Path::new("."), true);
        assert!(!res.ok);
        assert_eq!(res.captures.len(), 8);
        assert_eq!(res.last_code, 1);
        assert_eq!(res.captures[0].first_stderr_line(), Some("error: patch failed: a.txt:1"));
    }

    #[test]
    fn runner_errors_become_captures() {
        let runner = GitApplyRunner::new("/definitely/not/a/git/binary");
        let res = run_apply_cascade(&runner, "patch", Path::new("."), true);
        assert!(!res.ok);
        assert_eq!(res.captures.len(), 8);
        assert!(res.captures.iter().all(|c| c.exit_code == -1));
        assert!(res.captures[0].stderr.contains("spawn"));
    }
}
