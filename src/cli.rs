use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "stanpatch")]
#[command(
    about = "Apply LLM-authored unified diffs and File Ops scripts to a working tree, safely"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress spinners and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Debug-level logging on stderr (overridden by STANPATCH_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply a unified diff or File Ops block
    Patch(PatchArgs),

    /// Initialize a stanpatch.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PatchArgs {
    /// Patch text; when omitted, read --file, stdin or the clipboard
    pub input: Option<String>,

    /// Read the patch from a file (~ and $VARS are expanded)
    #[arg(short, long, conflicts_with_all = ["input", "from_clipboard"])]
    pub file: Option<String>,

    /// Read the patch from the system clipboard
    #[arg(long, conflicts_with = "input")]
    pub from_clipboard: bool,

    /// Validate only: diffs are checked and written to a sandbox, File Ops are dry-run
    #[arg(long)]
    pub check: bool,

    /// Repository root (auto-detected when omitted)
    #[arg(long)]
    pub repo_root: Option<PathBuf>,

    /// Workspace directory holding imports, the patch store and sandboxes
    #[arg(long)]
    pub stan_path: Option<String>,

    /// Print a single-line JSON report
    #[arg(long)]
    pub json: bool,

    /// Never copy diagnostics to the clipboard; print them instead
    #[arg(long)]
    pub no_clipboard: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
