//! Repo-relative path helpers shared by the policy, File Ops and the
//! in-process diff engines.
//!
//! Everything here is lexical: no symlink resolution, no filesystem access.
//! Targets that do not exist yet (new files) must still be checkable.

use std::path::{Component, Path, PathBuf};

/// Convert Windows separators to POSIX ones
pub fn to_posix(s: &str) -> String {
    s.replace('\\', "/")
}

/// True for `/x`, `\x`, `C:x` and `C:/x` style inputs
pub fn looks_absolute(s: &str) -> bool {
    let b = s.as_bytes();
    if s.starts_with('/') || s.starts_with('\\') {
        return true;
    }
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Normalize a repo-relative path string.
///
/// Returns `None` for empty, absolute or traversing (`..`) inputs. `.` and
/// empty segments are dropped, separators become `/`.
pub fn normalize_rel(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || looks_absolute(raw) {
        return None;
    }

    let posix = to_posix(raw);
    let mut parts: Vec<&str> = Vec::new();
    for seg in posix.split('/') {
        match seg {
            "" | "." => {}
            ".." => return None,
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Strip one leading `a/` or `b/` from a diff header name
pub fn strip_diff_prefix(name: &str) -> &str {
    name.strip_prefix("a/")
        .or_else(|| name.strip_prefix("b/"))
        .unwrap_or(name)
}

/// Join `rel` onto `root` and verify the result stays inside `root`.
///
/// `..` components are folded lexically; anything that would climb above
/// `root`, or an absolute `rel`, yields `None`.
pub fn resolve_within(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel_path = PathBuf::from(to_posix(rel));
    let mut out = root.to_path_buf();
    let floor = root.components().count();

    for c in rel_path.components() {
        match c {
            Component::Normal(seg) => out.push(seg),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.components().count() <= floor {
                    return None;
                }
                out.pop();
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if out == root || out.starts_with(root) {
        Some(out)
    } else {
        None
    }
}
