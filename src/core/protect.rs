//! The one authoritative check for the read-only imports area.
//!
//! `<stan_path>/imports/**` holds staged reference material. Nothing in the
//! patch pipeline may write there: the File Ops parser, the executor and the
//! diff orchestrator all gate on [`is_protected_imports_path`].

/// Collapse separators, `.` segments and a leading `./`; keeps `..` as is
fn canonical_rel(p: &str) -> String {
    p.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// True iff `rel` equals or is nested under `<stan_path>/imports`
pub fn is_protected_imports_path(stan_path: &str, rel: &str) -> bool {
    let base = canonical_rel(stan_path);
    let prefix = if base.is_empty() { "imports".to_string() } else { format!("{base}/imports") };
    let rel = canonical_rel(rel);

    rel == prefix || rel.strip_prefix(&prefix).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_root_and_nested() {
        assert!(is_protected_imports_path(".stan", ".stan/imports"));
        assert!(is_protected_imports_path(".stan", ".stan/imports/"));
        assert!(is_protected_imports_path(".stan", ".stan/imports/lib/a.ts"));
        assert!(is_protected_imports_path("./.stan/", "./.stan//imports/x"));
        assert!(is_protected_imports_path(".stan", ".stan\\imports\\x"));
    }

    #[test]
    fn siblings_are_not_protected() {
        assert!(!is_protected_imports_path(".stan", ".stan/imports2/a"));
        assert!(!is_protected_imports_path(".stan", ".stan/patch/.patch"));
        assert!(!is_protected_imports_path(".stan", "src/imports/a"));
        assert!(!is_protected_imports_path(".stan", "imports/a"));
        assert!(!is_protected_imports_path("stan", ".stan/imports/a"));
    }
}
