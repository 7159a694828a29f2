//! Payload kind selection.
//!
//! File Ops are header-driven: a `### File Ops` heading anywhere in the raw
//! payload selects them, whatever else the text contains. Otherwise the
//! cleaned text must satisfy the unified-diff predicate.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::core::normalize::looks_like_unified_diff;

static FILE_OPS_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^###[ \t]+file[ \t]+ops[ \t]*$").expect("file ops heading regex"));

/// Which engine handles a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchKind {
    FileOps,
    Diff,
}

/// Non-empty cleaned text carrying a unified-diff marker
pub fn is_unified_diff(cleaned: &str) -> bool {
    !cleaned.trim().is_empty() && looks_like_unified_diff(cleaned)
}

/// One line that is exactly a `### File Ops` heading (case-insensitive,
/// flexible inner spacing, no indentation)
pub fn is_file_ops_heading(line: &str) -> bool {
    FILE_OPS_HEADING_RE.is_match(line.trim_end_matches('\r'))
}

/// `### File Ops` heading present in the raw payload
pub fn has_file_ops_heading(raw: &str) -> bool {
    raw.lines().any(is_file_ops_heading)
}

/// Classify a payload; `None` when it is neither kind
pub fn detect_kind(raw: &str, cleaned: &str) -> Option<PatchKind> {
    if has_file_ops_heading(raw) {
        Some(PatchKind::FileOps)
    } else if is_unified_diff(cleaned) {
        Some(PatchKind::Diff)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_wins_over_diff_content() {
        let raw = "### File Ops\nrm a.txt\n\ndiff --git a/x b/x\n@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(detect_kind(raw, raw), Some(PatchKind::FileOps));
    }

    #[test]
    fn diff_and_garbage() {
        let diff = "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(detect_kind(diff, diff), Some(PatchKind::Diff));
        assert_eq!(detect_kind("hello", "hello\n"), None);
        assert!(!is_unified_diff("\n"));
    }

    #[test]
    fn heading_must_be_its_own_line() {
        assert!(has_file_ops_heading("Intro\r\n### File Ops\r\nrm a\r\n"));
        assert!(has_file_ops_heading("### file ops\n"));
        assert!(!has_file_ops_heading("see ### File Ops below\n"));
        assert!(!has_file_ops_heading("## File Ops\n"));
        assert!(has_file_ops_heading("###  File\tOps  \n"));
        assert!(!has_file_ops_heading("   ### File Ops\n"));
        assert!(!has_file_ops_heading("###\nFile\nOps\n"));
    }
}
