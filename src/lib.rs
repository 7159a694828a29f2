//! **stanpatch** - safe application of LLM-authored patches
//!
//! Accepts a unified diff or a `### File Ops` block, tolerates chat noise
//! around it, and either applies it fully or returns a diagnostics envelope.
//! Never writes outside the repository root or into the imports area.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Patch application pipeline
pub mod core {
    /// Wrapper removal, EOL/zero-width cleanup, diff extraction
    pub mod normalize;
    pub use normalize::clean_patch_text;

    /// File Ops vs unified diff classification
    pub mod detect;
    pub use detect::{PatchKind, detect_kind, is_unified_diff};

    /// Read-only `<stan_path>/imports` policy
    pub mod protect;
    pub use protect::is_protected_imports_path;

    /// File Ops grammar, parser and executor
    pub mod file_ops;
    pub use file_ops::{FileOp, FileOpsPlan, FileOpsReport, execute_file_ops, parse_file_ops};

    /// Unified diff model, tolerant parser and hunk placement
    pub mod patch;

    /// `git apply` strategy cascade
    pub mod git;
    pub use git::{ApplyResult, ApplyRunner, AttemptCapture, AttemptSpec, GitApplyRunner};

    /// In-process fallback engine
    pub mod jsdiff;
    pub use jsdiff::{FailureReason, JsDiffOutcome, JsFailure, TargetPath, apply_in_process};

    /// Single new-file recovery
    pub mod creation;

    /// Failure envelope formatting
    pub mod diagnostics;
    pub use diagnostics::Diagnostics;

    /// Orchestrator: policy, cascade, fallbacks
    pub mod pipeline;
    pub use pipeline::{PipelineOptions, PipelineOutcome, apply_patch_pipeline};

    /// Failure taxonomy and exit codes
    pub mod error;
    pub use error::{FailureKind, PatchCliError, finish_with_exit};

    /// `patch` command handler
    pub mod apply;
    pub use apply::{patch_run, patch_run_with};
}

/// Infrastructure - configuration, IO and path helpers
pub mod infra {
    /// Layered configuration (file + environment)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Atomic writes and tree copy/move/remove
    pub mod io;

    /// Repo-relative path validation
    pub mod paths;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{finish_with_exit, patch_run};
pub use infra::{Config, load_config};
