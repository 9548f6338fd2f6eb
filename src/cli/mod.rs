//! Command line interface.
//!
//! `shrinkwrap analyze` checks an entry reference without building;
//! `shrinkwrap build` runs the full pipeline. Settings layer as flags over
//! `[tool.shrinkwrap]` in `pyproject.toml` over built-in defaults.

mod args;
pub mod commands;
pub mod output;

pub use args::{AnalyzeArgs, Args, BuildArgs, Command, ToggleArgs};
pub use output::OutputManager;

use crate::error::Result;

/// Runs the parsed command line; returns the process exit code.
pub async fn run(args: &Args, output: &OutputManager) -> Result<i32> {
    match &args.command {
        Command::Analyze(analyze) => commands::analyze(analyze, output).await,
        Command::Build(build) => commands::build(build, output).await,
    }
}

/// Parse arguments without executing
pub fn parse_args() -> Args {
    Args::parse_args()
}
