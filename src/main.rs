use anyhow::Result;
use clap::Parser;
use stanpatch::cli::{AppContext, Cli, Commands};
use tracing_subscriber::EnvFilter;

/// `STANPATCH_LOG` wins; otherwise warn, or debug with --verbose
fn init_tracing(ctx: &AppContext) {
    let default = if ctx.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("STANPATCH_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!ctx.no_color)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        verbose: cli.verbose,
    };
    init_tracing(&ctx);

    match cli.command {
        Commands::Patch(args) => stanpatch::finish_with_exit(stanpatch::patch_run(args, &ctx)),
        Commands::Init(args) => stanpatch::infra::config::init(args, &ctx),
        Commands::Completions(args) => stanpatch::completion::run(args, &ctx),
    }
}
