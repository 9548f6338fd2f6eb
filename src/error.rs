//! Top-level error types for the `shrinkwrap` binary.
//!
//! Pipeline failures arrive tagged with the [`Stage`] that produced them so the
//! message the user sees always names where the build stopped.

use std::fmt;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Pipeline stage, used to tag errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Build configuration validation.
    Configure,
    /// Runtime discovery.
    Runtime,
    /// Dependency installation.
    Install,
    /// Copying sources into the staging tree.
    Stage,
    /// Import graph construction.
    Graph,
    /// Distribution pruning.
    Prune,
    /// Compilation and stripping.
    Optimize,
    /// Metadata snapshot.
    Freeze,
    /// Launcher generation.
    Launcher,
    /// Output format packaging.
    Package,
    /// Moving the artifact to its final path.
    Promote,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Runtime => "runtime",
            Self::Install => "install",
            Self::Stage => "stage",
            Self::Graph => "graph",
            Self::Prune => "prune",
            Self::Optimize => "optimize",
            Self::Freeze => "freeze",
            Self::Launcher => "launcher",
            Self::Package => "package",
            Self::Promote => "promote",
        };
        f.write_str(name)
    }
}

/// Main error type for all bundler operations
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pipeline error tagged with the failing stage
    #[error("[{stage}] {source}")]
    Stage {
        /// Stage that failed
        stage: Stage,
        /// Underlying pipeline error
        #[source]
        source: crate::bundler::Error,
    },

    /// Untagged pipeline error
    #[error("{0}")]
    Bundler(#[from] crate::bundler::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cli(_) | Self::Toml(_) => 2,
            Self::Stage { source, .. } | Self::Bundler(source) => source.exit_code(),
            Self::Io(_) | Self::Anyhow(_) => 1,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::bundler::Error as E;

        let source = match self {
            Self::Stage { source, .. } | Self::Bundler(source) => source.root(),
            Self::Cli(_) => return vec!["Run `shrinkwrap --help` for usage".to_string()],
            Self::Toml(_) => {
                return vec!["Check the [tool.shrinkwrap] table in pyproject.toml".to_string()];
            }
            _ => return Vec::new(),
        };

        match source {
            E::RuntimeNotFound(_) => vec![
                "Install Python 3.10+ and make sure `python3` is on PATH".to_string(),
                "Or point at an interpreter with --python / SHRINKWRAP_PYTHON".to_string(),
            ],
            E::UnsupportedRuntime { required, .. } => vec![format!(
                "Select an interpreter matching {required} with --python"
            )],
            E::MissingTool { tool, .. } if tool == "mksquashfs" => vec![
                "Install squashfs-tools (e.g. `apt install squashfs-tools`)".to_string(),
                "Or choose another format with --format".to_string(),
            ],
            E::OverrideConflict { .. } => {
                vec!["Remove the package from either --keep-package or --drop-package".to_string()]
            }
            E::ModuleConflict { .. } => vec![
                "Uninstall one of the conflicting distributions from the dependency set".to_string(),
            ],
            E::OutputExists(_) => vec!["Pass --force to replace the existing output".to_string()],
            E::OutputLocked(path) => vec![format!(
                "Wait for the other build to finish, or remove {}.lock if it is stale",
                path.display()
            )],
            E::InstallerFailed { .. } => vec![
                "Check requirements.txt; the installer output is shown above".to_string(),
            ],
            E::CompileFailed { .. } => {
                vec!["Fix the syntax error, or build with --keep-sources --no-optimize".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

/// Tag pipeline results with the stage that produced them.
pub trait StageExt<T> {
    /// Wrap the error in [`BundlerError::Stage`].
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for crate::bundler::Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| BundlerError::Stage { stage, source })
    }
}
