//! `stanpatch patch`: source resolution, kind dispatch and reporting
//!
//! Everything around the pipeline lives here: repository discovery, layered
//! config, reading the payload, persisting it verbatim, the spinner, and
//! delivering the diagnostics envelope on failure.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::{AppContext, PatchArgs};
use crate::core::{
    detect::{PatchKind, has_file_ops_heading, is_unified_diff},
    diagnostics::{Diagnostics, primary_target},
    error::{FailureKind, PatchCliError},
    file_ops::{FileOpsReport, execute_file_ops, parse_file_ops},
    git::{ApplyRunner, GitApplyRunner},
    jsdiff::{FailureReason, JsFailure, TargetPath},
    normalize::clean_patch_text,
    pipeline::{PipelineOptions, PipelineOutcome, apply_patch_pipeline, touched_paths},
};
use crate::infra::{
    config::load_config,
    io::{remove_path, write_with_parents},
};

/// Discover the git repo root with multiple fallback strategies
/// Returns Ok(None) when no repo is found
pub fn discover_repo_root(explicit: Option<PathBuf>, start: &Path) -> Result<Option<PathBuf>> {
    // 1) explicit override wins (canonicalize for stable prefix math)
    if let Some(root) = explicit {
        return Ok(Some(dunce::canonicalize(&root).unwrap_or(root)));
    }

    // 2) git rev-parse (worktree top-level)
    if let Ok(output) = std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(start)
        .output()
    {
        let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !s.is_empty() {
            let p = PathBuf::from(s);
            return Ok(Some(dunce::canonicalize(&p).unwrap_or(p)));
        }
    }

    // 3) ascend to find .git (directory or worktree file)
    let mut cur = Some(start);
    while let Some(dir) = cur {
        if dir.join(".git").exists() {
            let d = dir.to_path_buf();
            return Ok(Some(dunce::canonicalize(&d).unwrap_or(d)));
        }
        cur = dir.parent();
    }

    Ok(None)
}

/// Get content from system clipboard
fn get_clipboard_content() -> Result<String> {
    use arboard::Clipboard;
    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .get_text()
        .context("Failed to get text from clipboard")
}

fn copy_to_clipboard(content: &str) -> Result<()> {
    use arboard::Clipboard;
    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .set_text(content)
        .context("Failed to copy to clipboard")
}

/// Inline argument, then --file, then stdin when piped, else the clipboard
fn read_source(args: &PatchArgs) -> Result<String> {
    if let Some(text) = &args.input {
        return Ok(text.clone());
    }

    if let Some(file) = &args.file {
        let expanded = shellexpand::full(file)
            .map_err(|e| PatchCliError::InvalidInput(format!("cannot expand {file}: {e}")))?;
        return fs::read_to_string(&*expanded).map_err(|e| {
            PatchCliError::InvalidInput(format!("cannot read patch file {expanded}: {e}")).into()
        });
    }

    let stdin = io::stdin();
    if !args.from_clipboard && !stdin.is_terminal() {
        let mut buf = String::new();
        stdin
            .lock()
            .read_to_string(&mut buf)
            .context("Failed to read patch from stdin")?;
        return Ok(buf);
    }

    get_clipboard_content()
        .map_err(|e| PatchCliError::InvalidInput(format!("{e:#}")).into())
}

fn check_mark(ctx: &AppContext) -> String {
    if ctx.no_color { "✓".to_string() } else { "✓".green().to_string() }
}

fn cross_mark(ctx: &AppContext) -> String {
    if ctx.no_color { "✗".to_string() } else { "✗".red().to_string() }
}

fn spinner(ctx: &AppContext, hidden: bool) -> ProgressBar {
    if ctx.quiet || hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Applying patch");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Single-line JSON report for `--json`
#[derive(Debug, Serialize)]
struct PatchReport<'a> {
    kind: Option<PatchKind>,
    ok: bool,
    check: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline: Option<&'a PipelineOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_ops: Option<&'a FileOpsReport>,
    /// Category of the failure, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<&'a str>,
}

/// Resolved per-invocation settings
struct Session<'a> {
    ctx: &'a AppContext,
    args: &'a PatchArgs,
    repo_root: PathBuf,
    stan_path: String,
    clipboard: bool,
    keep_sandbox: bool,
}

impl Session<'_> {
    fn emit_json(&self, report: &PatchReport<'_>) -> Result<()> {
        let line = serde_json::to_string(report)
            .map_err(|e| PatchCliError::Internal(format!("JSON serialization failed: {e}")))?;
        println!("{line}");
        Ok(())
    }

    /// Clipboard when allowed and available, else print
    fn deliver(&self, envelope: &str) {
        if self.clipboard {
            match copy_to_clipboard(envelope) {
                Ok(()) => {
                    if !self.ctx.quiet {
                        eprintln!("{} Diagnostics copied to clipboard", cross_mark(self.ctx));
                    }
                    if !self.args.json {
                        return;
                    }
                }
                Err(e) => debug!(error = %format!("{e:#}"), "clipboard unavailable, printing"),
            }
        }
        if !self.args.json {
            print!("{envelope}");
        }
    }

    fn persist_raw(&self, raw: &str) {
        let path = self.repo_root.join(&self.stan_path).join("patch").join(".patch");
        match write_with_parents(&path, raw.as_bytes()) {
            Ok(()) => debug!(path = %path.display(), "raw payload persisted"),
            Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "could not persist raw payload"),
        }
    }

    fn run_file_ops(&self, raw: &str) -> Result<()> {
        let plan = parse_file_ops(raw, &self.stan_path);
        let mut errors = plan.errors.clone();
        if errors.is_empty() && plan.ops.is_empty() {
            errors.push("no operations found in File Ops block".to_string());
        }

        let (report, failure) = if errors.is_empty() {
            let report = execute_file_ops(&self.repo_root, &plan.ops, self.args.check);
            errors = report.error_lines();
            let failure = (!report.ok).then_some(FailureKind::FileOpsExecError);
            (Some(report), failure)
        } else {
            (None, Some(FailureKind::FileOpsParseError))
        };

        let ok = errors.is_empty();
        let envelope = (!ok).then(|| Diagnostics::FileOps { errors: &errors }.render());

        if self.args.json {
            self.emit_json(&PatchReport {
                kind: Some(PatchKind::FileOps),
                ok,
                check: self.args.check,
                pipeline: None,
                file_ops: report.as_ref(),
                failure,
                diagnostics: envelope.as_deref(),
            })?;
        }

        match envelope {
            None => {
                if !self.ctx.quiet && !self.args.json {
                    let verb = if self.args.check { "validated" } else { "applied" };
                    println!("{} File Ops {verb} ({} ops)", check_mark(self.ctx), plan.ops.len());
                }
                Ok(())
            }
            Some(text) => {
                self.deliver(&text);
                Err(PatchCliError::PatchFailed(format!("{} File Ops error(s)", errors.len())).into())
            }
        }
    }

    fn run_diff(&self, raw: &str, runner: &dyn ApplyRunner) -> Result<()> {
        let cleaned = clean_patch_text(raw);
        if !is_unified_diff(&cleaned) {
            let failure = [JsFailure::new(TargetPath::Unknown, FailureReason::InvalidDiff)];
            let envelope = Diagnostics::Diff {
                target: &TargetPath::Unknown,
                attempts: &[],
                js_failures: &failure,
            }
            .render();
            if self.args.json {
                self.emit_json(&PatchReport {
                    kind: None,
                    ok: false,
                    check: self.args.check,
                    pipeline: None,
                    file_ops: None,
                    failure: Some(FailureKind::InvalidDiff),
                    diagnostics: Some(&envelope),
                })?;
            }
            self.deliver(&envelope);
            return Err(PatchCliError::InvalidInput(
                "payload is neither a unified diff nor a File Ops block".to_string(),
            )
            .into());
        }

        let opts = PipelineOptions {
            repo_root: self.repo_root.clone(),
            stan_path: self.stan_path.clone(),
            check: self.args.check,
            sandbox_root: None,
        };
        let pb = spinner(self.ctx, self.args.json);
        let outcome = apply_patch_pipeline(&cleaned, runner, &opts);
        pb.finish_and_clear();

        let envelope = (!outcome.ok).then(|| {
            let touched: Vec<String> = touched_paths(&cleaned).into_iter().collect();
            let target = primary_target(outcome.js_failures(), &touched);
            Diagnostics::Diff {
                target: &target,
                attempts: &outcome.result.captures,
                js_failures: outcome.js_failures(),
            }
            .render()
        });

        if self.args.json {
            self.emit_json(&PatchReport {
                kind: Some(PatchKind::Diff),
                ok: outcome.ok,
                check: self.args.check,
                pipeline: Some(&outcome),
                file_ops: None,
                failure: outcome.js_failures().first().map(|f| f.kind),
                diagnostics: envelope.as_deref(),
            })?;
        } else if outcome.ok && !self.ctx.quiet {
            self.print_success(&outcome);
        }

        if self.args.check && !self.keep_sandbox {
            if let Some(root) = outcome.js.as_ref().and_then(|js| js.sandbox_root.as_deref()) {
                if let Err(e) = remove_path(root) {
                    debug!(error = %format!("{e:#}"), "sandbox cleanup failed");
                }
            }
        }

        match envelope {
            None => Ok(()),
            Some(text) => {
                self.deliver(&text);
                let failed = outcome.js_failures().len();
                Err(PatchCliError::PatchFailed(format!(
                    "{failed} file(s) could not be patched after {} git apply attempt(s)",
                    outcome.result.tried.len()
                ))
                .into())
            }
        }
    }

    fn print_success(&self, outcome: &PipelineOutcome) {
        let action = if self.args.check { "Patch check passed" } else { "Patch applied" };
        match &outcome.js {
            None => {
                let label = outcome.result.tried.last().map(String::as_str).unwrap_or("git");
                println!("{} {action} (git apply {label})", check_mark(self.ctx));
            }
            Some(js) => {
                println!(
                    "{} {action} in-process: {}",
                    check_mark(self.ctx),
                    js.ok_files.join(", ")
                );
                if let Some(root) = &js.sandbox_root {
                    if self.keep_sandbox {
                        println!("Sandbox: {}", root.display());
                    }
                }
            }
        }
    }
}

/// Entry point for `stanpatch patch`
pub fn patch_run(args: PatchArgs, ctx: &AppContext) -> Result<()> {
    patch_run_with(args, ctx, &GitApplyRunner::default())
}

/// Same as [`patch_run`] with an injectable apply runner
pub fn patch_run_with(args: PatchArgs, ctx: &AppContext, runner: &dyn ApplyRunner) -> Result<()> {
    // 1) Detect repo root (auto-detect with optional override)
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let repo_root = discover_repo_root(args.repo_root.clone(), &cwd)
        .context("Failed to detect repository root")?
        .unwrap_or_else(|| {
            debug!("no repository found, using current directory");
            cwd.clone()
        });

    // 2) Layered config, flags win
    let cfg = load_config(&repo_root)?;
    let session = Session {
        ctx,
        args: &args,
        stan_path: args.stan_path.clone().unwrap_or(cfg.stan_path),
        clipboard: cfg.patch.clipboard && !args.no_clipboard,
        keep_sandbox: cfg.patch.keep_sandbox,
        repo_root,
    };
    info!(repo = %session.repo_root.display(), stan_path = %session.stan_path, check = args.check, "patch session");

    // 3) Read and persist the payload before any parsing
    let raw = read_source(&args)?;
    if raw.trim().is_empty() {
        return Err(PatchCliError::InvalidInput("patch source is empty".to_string()).into());
    }
    if cfg.patch.persist_raw {
        session.persist_raw(&raw);
    }

    // 4) Dispatch on kind: the File Ops heading wins over diff content
    if has_file_ops_heading(&raw) {
        session.run_file_ops(&raw)
    } else {
        session.run_diff(&raw, runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let tmp = TempDir::new().unwrap();
        let got = discover_repo_root(Some(tmp.path().to_path_buf()), Path::new("/")).unwrap();
        assert_eq!(got, Some(dunce::canonicalize(tmp.path()).unwrap()));
    }

    #[test]
    fn ascends_to_dot_git() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        let got = discover_repo_root(None, &tmp.path().join("a/b")).unwrap().unwrap();
        assert_eq!(got, dunce::canonicalize(tmp.path()).unwrap());
    }

    #[test]
    fn inline_input_is_read_verbatim() {
        let args = PatchArgs {
            input: Some("--- a/x\n+++ b/x\n".into()),
            file: None,
            from_clipboard: false,
            check: false,
            repo_root: None,
            stan_path: None,
            json: false,
            no_clipboard: true,
        };
        assert_eq!(read_source(&args).unwrap(), "--- a/x\n+++ b/x\n");
    }

    #[test]
    fn unreadable_file_is_invalid_input() {
        let args = PatchArgs {
            input: None,
            file: Some("/definitely/missing.diff".into()),
            from_clipboard: false,
            check: false,
            repo_root: None,
            stan_path: None,
            json: false,
            no_clipboard: true,
        };
        let err = read_source(&args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchCliError>(),
            Some(PatchCliError::InvalidInput(_))
        ));
    }
}
