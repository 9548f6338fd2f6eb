//! Subcommand implementations.

mod analyze;
mod build;

pub use analyze::analyze;
pub use build::build;

use crate::error::{CliError, Result};
use crate::metadata::ProjectConfig;

/// The entry reference from the command line, else from the project config.
fn entry_reference(flag: Option<&str>, config: &ProjectConfig) -> Result<String> {
    flag.map(str::to_string)
        .or_else(|| config.entry.clone())
        .ok_or_else(|| {
            CliError::MissingArgument {
                argument: "--entry (or `entry` in [tool.shrinkwrap])".to_string(),
            }
            .into()
        })
}
