//! File Ops: a tiny verb language for filesystem mutations.
//!
//! ```text
//! ### File Ops
//! mkdirp src/new
//! mv     src/old.rs src/new/old.rs
//! cp     a.txt b.txt
//! rm     scratch/
//! rmdir  empty/
//! ```
//!
//! Parsing never fails as a whole: it yields the ops it could build plus a
//! list of line-numbered errors, and the caller treats any error as fatal
//! for the block. Execution is fail-fast in apply mode and exhaustive in
//! dry-run mode. Ops applied before a failure are not rolled back.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::detect::is_file_ops_heading;
use crate::core::error::FailureKind;
use crate::core::protect::is_protected_imports_path;
use crate::infra::io::{copy_tree, ensure_parent, move_path, remove_path};
use crate::infra::paths::{normalize_rel, resolve_within};

/// Repo-relative, POSIX-separated, traversal-free path.
///
/// The only constructor is [`RepoRelPath::parse`], so an invalid path can
/// never be held in a [`FileOp`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RepoRelPath(Utf8PathBuf);

impl RepoRelPath {
    pub fn parse(raw: &str) -> Option<Self> {
        normalize_rel(raw).map(|s| Self(Utf8PathBuf::from(s)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }
}

impl fmt::Display for RepoRelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Mv,
    Cp,
    Rm,
    Rmdir,
    Mkdirp,
}

impl Verb {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mv" => Some(Verb::Mv),
            "cp" => Some(Verb::Cp),
            "rm" => Some(Verb::Rm),
            "rmdir" => Some(Verb::Rmdir),
            "mkdirp" => Some(Verb::Mkdirp),
            _ => None,
        }
    }

    /// Number of path arguments
    pub fn arity(self) -> usize {
        match self {
            Verb::Mv | Verb::Cp => 2,
            Verb::Rm | Verb::Rmdir | Verb::Mkdirp => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Mv => "mv",
            Verb::Cp => "cp",
            Verb::Rm => "rm",
            Verb::Rmdir => "rmdir",
            Verb::Mkdirp => "mkdirp",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Mv { src: RepoRelPath, dest: RepoRelPath },
    Cp { src: RepoRelPath, dest: RepoRelPath },
    Rm { src: RepoRelPath },
    Rmdir { src: RepoRelPath },
    Mkdirp { src: RepoRelPath },
}

impl FileOp {
    pub fn verb(&self) -> Verb {
        match self {
            FileOp::Mv { .. } => Verb::Mv,
            FileOp::Cp { .. } => Verb::Cp,
            FileOp::Rm { .. } => Verb::Rm,
            FileOp::Rmdir { .. } => Verb::Rmdir,
            FileOp::Mkdirp { .. } => Verb::Mkdirp,
        }
    }

    pub fn src(&self) -> &RepoRelPath {
        match self {
            FileOp::Mv { src, .. }
            | FileOp::Cp { src, .. }
            | FileOp::Rm { src }
            | FileOp::Rmdir { src }
            | FileOp::Mkdirp { src } => src,
        }
    }

    pub fn dest(&self) -> Option<&RepoRelPath> {
        match self {
            FileOp::Mv { dest, .. } | FileOp::Cp { dest, .. } => Some(dest),
            _ => None,
        }
    }

    fn build(verb: Verb, mut paths: Vec<RepoRelPath>) -> Self {
        // Arity was checked by the parser
        let src = paths.remove(0);
        match verb {
            Verb::Mv => FileOp::Mv { src, dest: paths.remove(0) },
            Verb::Cp => FileOp::Cp { src, dest: paths.remove(0) },
            Verb::Rm => FileOp::Rm { src },
            Verb::Rmdir => FileOp::Rmdir { src },
            Verb::Mkdirp => FileOp::Mkdirp { src },
        }
    }
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dest() {
            Some(dest) => write!(f, "{} {} {}", self.verb(), self.src(), dest),
            None => write!(f, "{} {}", self.verb(), self.src()),
        }
    }
}

/// Parser output: buildable ops plus every problem found
#[derive(Debug, Clone, Default)]
pub struct FileOpsPlan {
    pub ops: Vec<FileOp>,
    pub errors: Vec<String>,
}

fn is_heading(line: &str, hashes: &str) -> bool {
    line.strip_prefix(hashes)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

fn is_fence(line: &str) -> bool {
    line.starts_with("```") || line.starts_with("~~~")
}

/// Lines of the first `### File Ops` section, numbered from 1 after the
/// heading; stops at the next `##`/`###` heading.
pub fn extract_file_ops_block(raw: &str) -> Option<Vec<(usize, String)>> {
    let text = raw.replace("\r\n", "\n");
    let mut lines = text.lines();
    lines.by_ref().find(|l| is_file_ops_heading(l))?;

    let mut out = Vec::new();
    for (idx, line) in lines.enumerate() {
        let trimmed = line.trim();
        if is_heading(trimmed, "##") || is_heading(trimmed, "###") {
            break;
        }
        out.push((idx + 1, trimmed.to_string()));
    }
    Some(out)
}

/// Parse the File Ops section of `raw` into a plan
pub fn parse_file_ops(raw: &str, stan_path: &str) -> FileOpsPlan {
    let mut plan = FileOpsPlan::default();
    let Some(block) = extract_file_ops_block(raw) else {
        return plan;
    };

    for (n, line) in block {
        if line.is_empty() || is_fence(&line) {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(verb_tok) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();

        let Some(verb) = Verb::parse(verb_tok) else {
            plan.errors.push(format!("line {n}: unknown verb \"{verb_tok}\""));
            continue;
        };

        if args.len() != verb.arity() {
            plan.errors.push(format!(
                "line {n}: expected {} paths, got {}",
                verb.arity(),
                args.len()
            ));
            continue;
        }

        let mut paths = Vec::with_capacity(args.len());
        let mut line_ok = true;
        for arg in args {
            match RepoRelPath::parse(arg) {
                None => {
                    plan.errors.push(format!("line {n}: invalid repo-relative path \"{arg}\""));
                    line_ok = false;
                }
                Some(p) if is_protected_imports_path(stan_path, p.as_str()) => {
                    plan.errors
                        .push(format!("line {n}: path targets protected imports area \"{p}\""));
                    line_ok = false;
                }
                Some(p) => paths.push(p),
            }
        }

        if line_ok {
            plan.ops.push(FileOp::build(verb, paths));
        }
    }

    debug!(ops = plan.ops.len(), errors = plan.errors.len(), "parsed file ops");
    plan
}

/// Precondition or IO failure of a single op
#[derive(Debug, thiserror::Error)]
pub enum FileOpError {
    #[error("path escapes repository root: {0}")]
    EscapesRoot(String),
    #[error("source does not exist")]
    SourceMissing,
    #[error("destination exists (no overwrite)")]
    DestinationExists,
    #[error("path does not exist")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("path exists and is not a directory")]
    NotDirectoryTarget,
    #[error("{0}")]
    Io(String),
}

impl FileOpError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::FileOpsExecError
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Ok,
    Failed,
}

/// Outcome of one op; results are 1:1 with attempted ops, in order
#[derive(Debug, Clone, Serialize)]
pub struct OpResult {
    pub verb: Verb,
    pub src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOpsReport {
    pub ok: bool,
    pub results: Vec<OpResult>,
}

impl FileOpsReport {
    /// `"<op>: <message>"` for every failed op, in order
    pub fn error_lines(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.status == OpStatus::Failed)
            .map(|r| {
                let op = match &r.dest {
                    Some(d) => format!("{} {} {}", r.verb, r.src, d),
                    None => format!("{} {}", r.verb, r.src),
                };
                format!("{op}: {}", r.message.as_deref().unwrap_or("failed"))
            })
            .collect()
    }
}

fn exists(p: &Path) -> bool {
    fs::symlink_metadata(p).is_ok()
}

fn resolve(cwd: &Path, rel: &RepoRelPath) -> Result<PathBuf, FileOpError> {
    resolve_within(cwd, rel.as_str()).ok_or_else(|| FileOpError::EscapesRoot(rel.to_string()))
}

fn io_err(e: anyhow::Error) -> FileOpError {
    FileOpError::Io(format!("{e:#}"))
}

/// Validate preconditions and, unless `dry_run`, perform one op
fn run_op(cwd: &Path, op: &FileOp, dry_run: bool) -> Result<(), FileOpError> {
    let src = resolve(cwd, op.src())?;
    let dest = op.dest().map(|d| resolve(cwd, d)).transpose()?;

    match (op, dest) {
        (FileOp::Mv { .. }, Some(dest)) | (FileOp::Cp { .. }, Some(dest)) => {
            if !exists(&src) {
                return Err(FileOpError::SourceMissing);
            }
            if exists(&dest) {
                return Err(FileOpError::DestinationExists);
            }
            if dry_run {
                return Ok(());
            }
            if op.verb() == Verb::Mv {
                move_path(&src, &dest).map_err(io_err)
            } else {
                ensure_parent(&dest).map_err(io_err)?;
                copy_tree(&src, &dest).map_err(io_err)
            }
        }
        (FileOp::Rm { .. }, _) => {
            if !exists(&src) {
                return Err(FileOpError::NotFound);
            }
            if dry_run {
                return Ok(());
            }
            remove_path(&src).map_err(io_err)
        }
        (FileOp::Rmdir { .. }, _) => {
            if !exists(&src) {
                return Err(FileOpError::NotFound);
            }
            if !src.is_dir() {
                return Err(FileOpError::NotADirectory);
            }
            let mut entries = fs::read_dir(&src).map_err(|e| FileOpError::Io(e.to_string()))?;
            if entries.next().is_some() {
                return Err(FileOpError::DirectoryNotEmpty);
            }
            if dry_run {
                return Ok(());
            }
            fs::remove_dir(&src).map_err(|e| FileOpError::Io(e.to_string()))
        }
        (FileOp::Mkdirp { .. }, _) => {
            if exists(&src) && !src.is_dir() {
                return Err(FileOpError::NotDirectoryTarget);
            }
            if dry_run {
                return Ok(());
            }
            fs::create_dir_all(&src).map_err(|e| FileOpError::Io(e.to_string()))
        }
        // mv/cp always carry a destination
        (FileOp::Mv { .. }, None) | (FileOp::Cp { .. }, None) => {
            Err(FileOpError::Io("missing destination".into()))
        }
    }
}

/// Execute a plan against `cwd`.
///
/// Apply mode stops at the first failure; dry-run validates every op
/// without touching the filesystem.
pub fn execute_file_ops(cwd: &Path, ops: &[FileOp], dry_run: bool) -> FileOpsReport {
    let mut results = Vec::with_capacity(ops.len());

    for op in ops {
        let outcome = run_op(cwd, op, dry_run);
        let failed = outcome.is_err();

        match &outcome {
            Ok(()) => info!(op = %op, dry_run, "file op ok"),
            Err(e) => warn!(op = %op, dry_run, error = %e, "file op failed"),
        }

        let err = outcome.err();
        results.push(OpResult {
            verb: op.verb(),
            src: op.src().to_string(),
            dest: op.dest().map(|d| d.to_string()),
            status: if failed { OpStatus::Failed } else { OpStatus::Ok },
            message: err.as_ref().map(|e| e.to_string()),
            kind: err.as_ref().map(FileOpError::kind),
        });

        if failed && !dry_run {
            break;
        }
    }

    let ok = results.iter().all(|r| r.status == OpStatus::Ok);
    FileOpsReport { ok, results }
}
