//! Last-resort recovery for single new-file diffs.
//!
//! A diff that only creates one file can be recovered by pure text
//! extraction even when its hunk header is garbled: keep `+` and context
//! lines after the first `@@`, drop `-` lines. Anything ambiguous (more
//! than one file, no hunk marker, unsafe path) aborts without writing.

use std::path::Path;

use tracing::debug;

use crate::core::jsdiff::{JsDiffOutcome, sandbox_base};
use crate::core::patch::DEV_NULL;
use crate::core::protect::is_protected_imports_path;
use crate::infra::io::write_with_parents;
use crate::infra::paths::{normalize_rel, resolve_within, strip_diff_prefix};

fn is_header_pair(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("--- ") && lines.get(i + 1).is_some_and(|n| n.starts_with("+++ "))
}

fn side_name(line: &str) -> &str {
    let rest = &line[4..];
    rest.split('\t').next().unwrap_or(rest).trim()
}

/// Path and body of the sole creation record, if the text has exactly one
/// file header pair and it creates a file
fn extract_sole_creation(cleaned: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = cleaned.lines().collect();
    let headers: Vec<usize> = (0..lines.len()).filter(|&i| is_header_pair(&lines, i)).collect();

    // Multi-file payloads are refused, never partially applied
    let [at] = headers.as_slice() else {
        debug!(headers = headers.len(), "creation fallback needs exactly one file header");
        return None;
    };
    if side_name(lines[*at]) != DEV_NULL {
        return None;
    }
    let new_side = side_name(lines[at + 1]);
    if new_side == DEV_NULL {
        return None;
    }
    let rel = normalize_rel(strip_diff_prefix(new_side))?;

    let body_start = (at + 2..lines.len()).find(|&i| lines[i].starts_with("@@"))? + 1;
    let mut body: Vec<&str> = Vec::new();
    for line in &lines[body_start..] {
        if line.starts_with("diff --git ") {
            break;
        }
        if let Some(s) = line.strip_prefix('+').or_else(|| line.strip_prefix(' ')) {
            body.push(s);
        } else if line.is_empty() {
            body.push("");
        }
        // `-`, `\` and repeated `@@` lines are dropped
    }

    let mut text = body.join("\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Some((rel, text))
}

/// Try to recover a single new-file diff. `Some` only on a successful
/// write; in apply mode an existing file is never overwritten.
pub fn try_create_file(
    cleaned: &str,
    repo_root: &Path,
    stan_path: &str,
    check: bool,
    sandbox_root: Option<&Path>,
) -> Option<JsDiffOutcome> {
    let (rel, text) = extract_sole_creation(cleaned)?;
    if is_protected_imports_path(stan_path, &rel) {
        return None;
    }
    let repo_path = resolve_within(repo_root, &rel)?;

    let sandbox = check.then(|| {
        sandbox_root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sandbox_base(repo_root, stan_path))
    });
    let dest = match &sandbox {
        Some(root) => root.join(&rel),
        None => {
            if repo_path.exists() {
                debug!(path = %rel, "creation fallback refuses to overwrite");
                return None;
            }
            repo_path
        }
    };

    if let Err(e) = write_with_parents(&dest, text.as_bytes()) {
        debug!(path = %rel, error = %e, "creation fallback write failed");
        return None;
    }
    debug!(path = %rel, check, "created via fallback");
    Some(JsDiffOutcome { ok_files: vec![rel], failed: Vec::new(), sandbox_root: sandbox })
}
