//! Failure taxonomy and CLI exit-code mapping

use anyhow::Result;
use serde::Serialize;

/// Category of a pipeline failure, carried as data on every failed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Unparseable or empty diff
    InvalidDiff,
    /// File absent and the diff does not create it
    TargetMissing,
    /// Hunk could not be located
    PlacementFailure,
    /// Write refused by the imports policy or root containment
    ProtectedPath,
    /// IO error while writing
    WriteFailure,
    /// Bad verb, arity or path in a File Ops block
    FileOpsParseError,
    /// Execution precondition violated
    FileOpsExecError,
}

/// Domain-specific error taxonomy for exit-code mapping
#[derive(thiserror::Error, Debug, Clone)]
pub enum PatchCliError {
    /// Payload is neither File Ops nor a unified diff, or cannot be read
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Payload was understood but could not be applied
    #[error("patch failed: {0}")]
    PatchFailed(String),

    /// Unexpected bugs or environment failures
    #[error("internal error: {0}")]
    Internal(String),
}

/// 0=success, 2=patch failed, 3=invalid input, 5=internal
pub fn exit_code_for(e: &PatchCliError) -> i32 {
    match e {
        PatchCliError::PatchFailed(_) => 2,
        PatchCliError::InvalidInput(_) => 3,
        PatchCliError::Internal(_) => 5,
    }
}

/// Convert Result<()> to exit codes for CLI harness
pub fn finish_with_exit(result: Result<()>) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let typed = match e.downcast_ref::<PatchCliError>() {
                Some(typed) => typed.clone(),
                None => PatchCliError::Internal(format!("{e:#}")),
            };
            eprintln!("{typed}");
            std::process::exit(exit_code_for(&typed));
        }
    }
}
