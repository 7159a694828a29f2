//! Diff pipeline orchestrator
//!
//! Policy check, then the git cascade, then the in-process engine, then the
//! single-file creation fallback. Every stage runs strictly after the
//! previous one finished so each observes the untouched pre-patch tree.

use std::path::{Path, PathBuf};

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{
    creation::try_create_file,
    git::{ApplyResult, ApplyRunner, run_apply_cascade},
    jsdiff::{FailureReason, JsDiffOutcome, JsFailure, TargetPath, apply_in_process, sandbox_base},
    patch::{DEV_NULL, parse_unified_diff},
    protect::is_protected_imports_path,
};
use crate::infra::paths::{strip_diff_prefix, to_posix};

/// Inputs resolved by the caller
#[derive(Debug, Clone)]
pub struct PipelineOptions
{
    pub repo_root: PathBuf,
    pub stan_path: String,
    /// Validate only; the working tree is never written
    pub check: bool,
    /// Check-mode scratch root; a fresh per-invocation directory when unset
    pub sandbox_root: Option<PathBuf>,
}

/// Final verdict for one diff payload
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome
{
    pub ok: bool,
    pub result: ApplyResult,
    /// `None` when the cascade succeeded
    pub js: Option<JsDiffOutcome>,
}

impl PipelineOutcome
{
    /// Failures recorded by the in-process stage (empty if it never ran)
    pub fn js_failures(&self) -> &[JsFailure]
    {
        match &self.js
        {
            Some(js) => &js.failed,
            None => &[],
        }
    }
}

/// Sandbox session id: UTC timestamp plus a random suffix
pub fn generate_session_id() -> String
{
    let ts = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let alphabet = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..10)
        .map(|_| {
            let idx = rng.random_range(0..alphabet.len());
            alphabet[idx] as char
        })
        .collect();
    format!("{}_{}", ts, suffix)
}

/// `<repo>/<stan_path>/patch/.sandbox/<session-id>`, private to one call
pub fn session_sandbox(
    repo_root: &Path,
    stan_path: &str,
) -> PathBuf
{
    sandbox_base(repo_root, stan_path).join(generate_session_id())
}

/// Repo-relative paths named on either side of every file record, in
/// order of appearance. `/dev/null` sides are skipped.
pub fn touched_paths(cleaned: &str) -> IndexSet<String>
{
    let mut out = IndexSet::new();
    for record in parse_unified_diff(cleaned)
    {
        for name in [record.old_name.as_deref(), record.new_name.as_deref()]
            .into_iter()
            .flatten()
        {
            if name.is_empty() || name == DEV_NULL
            {
                continue;
            }
            out.insert(to_posix(strip_diff_prefix(name)));
        }
    }
    out
}

/// Where the cascade may land a header name: as written (`-p0`) and with
/// its first segment dropped (`-p1`), whatever that segment is
fn strip_level_forms(name: &str) -> Vec<String>
{
    let posix = to_posix(name.trim());
    let mut forms = Vec::with_capacity(2);
    if let Some((_, rest)) = posix.split_once('/')
    {
        forms.push(rest.to_string());
    }
    forms.push(posix);
    forms
}

/// Header names the diff must not touch, keyed by the path reported.
///
/// Every name in every record header is checked at both strip levels the
/// cascade uses. Any `..` segment is refused outright.
pub fn policy_violations(
    cleaned: &str,
    stan_path: &str,
) -> Vec<JsFailure>
{
    let mut refused: IndexMap<String, FailureReason> = IndexMap::new();
    for record in parse_unified_diff(cleaned)
    {
        for name in &record.header_names
        {
            if name.is_empty() || name == DEV_NULL
            {
                continue;
            }
            let forms = strip_level_forms(name);
            if forms.iter().any(|f| f.split('/').any(|seg| seg == ".."))
            {
                refused
                    .entry(to_posix(strip_diff_prefix(name)))
                    .or_insert(FailureReason::EscapesRoot);
            }
            else if let Some(hit) = forms.iter().find(|f| is_protected_imports_path(stan_path, f))
            {
                refused.entry(hit.clone()).or_insert(FailureReason::Protected);
            }
        }
    }
    refused
        .into_iter()
        .map(|(path, reason)| JsFailure::new(TargetPath::Known(path), reason))
        .collect()
}

/// Run the whole diff pipeline for one cleaned payload
pub fn apply_patch_pipeline(
    cleaned: &str,
    runner: &dyn ApplyRunner,
    opts: &PipelineOptions,
) -> PipelineOutcome
{
    // 1) Policy check: nothing runs if any header could reach a refused path
    let failed = policy_violations(cleaned, &opts.stan_path);
    if !failed.is_empty()
    {
        let paths: Vec<String> = failed.iter().map(|f| f.path.to_string()).collect();
        warn!(paths = ?paths, "refusing diff touching protected or escaping paths");
        return PipelineOutcome {
            ok: false,
            result: ApplyResult::not_run(),
            js: Some(JsDiffOutcome { failed, ..JsDiffOutcome::default() }),
        };
    }

    // 2) git apply cascade
    let result = run_apply_cascade(runner, cleaned, &opts.repo_root, opts.check);
    if result.ok
    {
        return PipelineOutcome { ok: true, result, js: None };
    }
    info!(tried = result.tried.len(), "git apply cascade exhausted, trying in-process engine");

    // 3) In-process engine; check mode gets a fresh sandbox
    let sandbox = if opts.check
    {
        Some(
            opts.sandbox_root
                .clone()
                .unwrap_or_else(|| session_sandbox(&opts.repo_root, &opts.stan_path)),
        )
    }
    else
    {
        None
    };
    let js = apply_in_process(
        cleaned,
        &opts.repo_root,
        &opts.stan_path,
        opts.check,
        sandbox.as_deref(),
    );
    if js.is_clean_success()
    {
        return PipelineOutcome { ok: true, result, js: Some(js) };
    }

    // 4) Creation fallback for a lone new-file diff
    if let Some(created) = try_create_file(
        cleaned,
        &opts.repo_root,
        &opts.stan_path,
        opts.check,
        sandbox.as_deref(),
    )
    {
        info!(files = ?created.ok_files, "recovered via creation fallback");
        return PipelineOutcome { ok: true, result, js: Some(created) };
    }

    warn!(failed = js.failed.len(), "patch could not be applied");
    PipelineOutcome { ok: false, result, js: Some(js) }
}
