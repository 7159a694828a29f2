//! Failure envelope shared by every caller.
//!
//! Pure text formatting: no IO, no errors. The envelope is what gets
//! copied to the clipboard (or printed) so it can be pasted back to the
//! author of the patch.

use crate::core::git::AttemptCapture;
use crate::core::jsdiff::{JsFailure, TargetPath};

pub const START_MARKER: &str = "START PATCH DIAGNOSTICS";
pub const END_MARKER: &str = "END PATCH DIAGNOSTICS";

/// What failed, with everything needed to explain it
#[derive(Debug, Clone, Copy)]
pub enum Diagnostics<'a> {
    Diff {
        target: &'a TargetPath,
        attempts: &'a [AttemptCapture],
        js_failures: &'a [JsFailure],
    },
    FileOps {
        errors: &'a [String],
    },
}

/// `<label>: exit <code>[ — <first stderr line>]`
fn attempt_line(c: &AttemptCapture) -> String {
    match c.first_stderr_line() {
        Some(first) => format!("{}: exit {} — {}", c.label, c.exit_code, first),
        None => format!("{}: exit {}", c.label, c.exit_code),
    }
}

impl Diagnostics<'_> {
    fn header(&self) -> String {
        match self {
            Diagnostics::Diff { target: TargetPath::Known(p), .. } => {
                format!("The unified diff patch for file {p} was invalid.")
            }
            Diagnostics::Diff { target: TargetPath::Unknown, .. } => {
                "The unified diff patch was invalid.".to_string()
            }
            Diagnostics::FileOps { .. } => "The File Ops patch failed.".to_string(),
        }
    }

    fn body(&self) -> Vec<String> {
        match self {
            Diagnostics::Diff { attempts, js_failures, .. } => attempts
                .iter()
                .map(attempt_line)
                .chain(js_failures.iter().map(|f| format!("jsdiff: {}: {}", f.path, f.reason)))
                .collect(),
            Diagnostics::FileOps { errors } => errors.to_vec(),
        }
    }

    /// Render the envelope; always ends with a newline
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.header());
        out.push_str("\n\n");
        out.push_str(START_MARKER);
        out.push('\n');
        for line in self.body() {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(END_MARKER);
        out.push('\n');
        out
    }
}

/// First known path among the failures, else the first touched path
pub fn primary_target(js_failures: &[JsFailure], touched: &[String]) -> TargetPath {
    js_failures
        .iter()
        .find_map(|f| f.path.known())
        .or_else(|| touched.first().map(String::as_str))
        .map_or(TargetPath::Unknown, |p| TargetPath::Known(p.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jsdiff::FailureReason;

    #[test]
    fn file_ops_envelope_is_verbatim() {
        let errors = vec!["line 1: unknown verb \"zap\"".to_string()];
        let text = Diagnostics::FileOps { errors: &errors }.render();
        assert_eq!(
            text,
            "The File Ops patch failed.\n\nSTART PATCH DIAGNOSTICS\nline 1: unknown verb \"zap\"\nEND PATCH DIAGNOSTICS\n"
        );
    }

    #[test]
    fn primary_target_prefers_failures() {
        let failures = vec![
            JsFailure::new(TargetPath::Unknown, FailureReason::NoFileName),
            JsFailure::new(TargetPath::Known("b.rs".into()), FailureReason::Unplaceable),
        ];
        let touched = vec!["a.rs".to_string()];
        assert_eq!(primary_target(&failures, &touched), TargetPath::Known("b.rs".into()));
        assert_eq!(primary_target(&[], &touched), TargetPath::Known("a.rs".into()));
        assert_eq!(primary_target(&[], &[]), TargetPath::Unknown);
    }

    #[test]
    fn generic_header_without_a_path() {
        let text = Diagnostics::Diff { target: &TargetPath::Unknown, attempts: &[], js_failures: &[] }
            .render();
        assert!(text.starts_with("The unified diff patch was invalid.\n"));
        assert!(text.ends_with("START PATCH DIAGNOSTICS\nEND PATCH DIAGNOSTICS\n"));
    }
}
