//! In-process fallback engine.
//!
//! Runs when every `git apply` attempt failed. Each file record is placed
//! with the tolerant comparator from [`crate::core::patch`] and written on
//! its own, so one bad file never blocks the others. In check mode nothing
//! under the repository root is written; results land in a sandbox.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::core::error::FailureKind;
use crate::core::patch::{FilePatch, PlaceError, apply_hunks, parse_unified_diff};
use crate::core::protect::is_protected_imports_path;
use crate::infra::io::{read_if_exists, remove_path, write_with_parents};
use crate::infra::paths::{normalize_rel, resolve_within, strip_diff_prefix, to_posix};

/// File a failure refers to, or no file at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPath {
    Known(String),
    Unknown,
}

impl TargetPath {
    pub fn known(&self) -> Option<&str> {
        match self {
            TargetPath::Known(p) => Some(p),
            TargetPath::Unknown => None,
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPath::Known(p) => f.write_str(p),
            TargetPath::Unknown => f.write_str("(patch)"),
        }
    }
}

impl Serialize for TargetPath {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Why one file record failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("invalid unified diff")]
    InvalidDiff,
    #[error("no file name in patch header")]
    NoFileName,
    #[error("target file not found")]
    TargetMissing,
    #[error("unable to place hunk(s)")]
    Unplaceable,
    #[error("unable to parse or place hunk(s)")]
    ParseOrPlace,
    #[error("write failed")]
    WriteFailed,
    #[error("refusing to modify protected imports path")]
    Protected,
    #[error("path escapes repository root")]
    EscapesRoot,
}

impl FailureReason {
    pub fn kind(self) -> FailureKind {
        match self {
            FailureReason::InvalidDiff | FailureReason::NoFileName => FailureKind::InvalidDiff,
            FailureReason::TargetMissing => FailureKind::TargetMissing,
            FailureReason::Unplaceable | FailureReason::ParseOrPlace => {
                FailureKind::PlacementFailure
            }
            FailureReason::WriteFailed => FailureKind::WriteFailure,
            FailureReason::Protected | FailureReason::EscapesRoot => FailureKind::ProtectedPath,
        }
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsFailure {
    pub path: TargetPath,
    pub reason: FailureReason,
    pub kind: FailureKind,
}

impl JsFailure {
    pub fn new(path: TargetPath, reason: FailureReason) -> Self {
        Self { path, reason, kind: reason.kind() }
    }
}

/// Aggregated per-file outcome for one payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JsDiffOutcome {
    pub ok_files: Vec<String>,
    pub failed: Vec<JsFailure>,
    /// Set in check mode: where the patched files were written
    pub sandbox_root: Option<PathBuf>,
}

impl JsDiffOutcome {
    /// At least one file applied and none failed
    pub fn is_clean_success(&self) -> bool {
        !self.ok_files.is_empty() && self.failed.is_empty()
    }

    fn global_failure(reason: FailureReason) -> Self {
        Self {
            failed: vec![JsFailure::new(TargetPath::Unknown, reason)],
            ..Self::default()
        }
    }
}

/// Markdown drifts with prose reflow and tolerates one line of slack
fn fuzz_for(rel: &str) -> usize {
    let is_md = Path::new(rel)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
    usize::from(is_md)
}

fn has_crlf(text: &str) -> bool {
    memchr::memmem::find(text.as_bytes(), b"\r\n").is_some()
}

struct Target<'a> {
    repo_root: &'a Path,
    stan_path: &'a str,
    /// `Some` in check mode
    sandbox: Option<&'a Path>,
}

impl Target<'_> {
    fn apply_record(&self, record: &FilePatch, rel: &str) -> Result<(), FailureReason> {
        if is_protected_imports_path(self.stan_path, rel) {
            return Err(FailureReason::Protected);
        }
        let repo_path = resolve_within(self.repo_root, rel).ok_or(FailureReason::EscapesRoot)?;

        // Absence is `Ok(None)`; any other read error is internal
        let existing = read_if_exists(&repo_path).map_err(|e| {
            warn!(path = %rel, error = %format!("{e:#}"), "target unreadable");
            FailureReason::ParseOrPlace
        })?;
        let original = match existing {
            Some(text) => text,
            None if record.is_creation() => String::new(),
            None => return Err(FailureReason::TargetMissing),
        };

        let crlf = has_crlf(&original);
        let lf = original.replace("\r\n", "\n");
        let patched = apply_hunks(&lf, &record.hunks, fuzz_for(rel)).map_err(|e| match e {
            PlaceError::NoFit { index } => {
                debug!(path = %rel, hunk = index, "hunk placement failed");
                FailureReason::Unplaceable
            }
            PlaceError::NoHunks => FailureReason::ParseOrPlace,
        })?;

        if record.is_deletion() {
            // Validated above; removal only touches the real tree
            if self.sandbox.is_none() {
                remove_path(&repo_path).map_err(|e| {
                    warn!(path = %rel, error = %e, "delete failed");
                    FailureReason::WriteFailed
                })?;
            }
            return Ok(());
        }

        let body = if crlf { patched.replace('\n', "\r\n") } else { patched };
        let dest = match self.sandbox {
            Some(root) => root.join(rel),
            None => repo_path,
        };
        write_with_parents(&dest, body.as_bytes()).map_err(|e| {
            warn!(path = %rel, error = %e, "write failed");
            FailureReason::WriteFailed
        })
    }
}

/// Default check-mode scratch area: `<repo>/<stan_path>/patch/.sandbox`
pub fn sandbox_base(repo_root: &Path, stan_path: &str) -> PathBuf {
    repo_root.join(stan_path).join("patch").join(".sandbox")
}

/// Apply a cleaned diff in-process, collecting every per-file failure.
///
/// Never panics or returns an error: unusable input becomes a single
/// failure against [`TargetPath::Unknown`].
pub fn apply_in_process(
    cleaned: &str,
    repo_root: &Path,
    stan_path: &str,
    check: bool,
    sandbox_root: Option<&Path>,
) -> JsDiffOutcome {
    let records = parse_unified_diff(cleaned);
    if records.iter().all(|r| r.target_name().is_none()) {
        debug!(records = records.len(), "no usable file records");
        return JsDiffOutcome::global_failure(FailureReason::InvalidDiff);
    }

    let sandbox = check.then(|| {
        sandbox_root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sandbox_base(repo_root, stan_path))
    });
    let target = Target { repo_root, stan_path, sandbox: sandbox.as_deref() };

    let mut outcome = JsDiffOutcome { sandbox_root: sandbox.clone(), ..JsDiffOutcome::default() };
    for record in &records {
        let Some(name) = record.target_name() else {
            outcome.failed.push(JsFailure::new(TargetPath::Unknown, FailureReason::NoFileName));
            continue;
        };
        let Some(rel) = normalize_rel(strip_diff_prefix(name)) else {
            outcome.failed.push(JsFailure::new(
                TargetPath::Known(to_posix(strip_diff_prefix(name))),
                FailureReason::EscapesRoot,
            ));
            continue;
        };

        match target.apply_record(record, &rel) {
            Ok(()) => {
                info!(path = %rel, check, "applied in-process");
                outcome.ok_files.push(rel);
            }
            Err(reason) => outcome.failed.push(JsFailure::new(TargetPath::Known(rel), reason)),
        }
    }

    outcome
}
