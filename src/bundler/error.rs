//! Error types for the bundle pipeline.
//!
//! Every stage returns [`Result`]. Path-carrying I/O failures are built with
//! [`ErrorExt::fs_context`] so the offending path always reaches the user, and
//! free-form failures use [`bail!`](crate::bail) or [`Context`].

use std::{fmt::Display, io, path::PathBuf};
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building a bundle.
#[derive(Error, Debug)]
pub enum Error {
    /// Free-form error message.
    #[error("{0}")]
    GenericError(String),

    /// An error with additional context prepended.
    #[error("{0}: {1}")]
    Context(String, Box<Error>),

    /// Raw I/O error without a known path.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// I/O error on a known path.
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// What was being attempted.
        context: &'static str,
        /// The offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        error: io::Error,
    },

    /// A child process could not be spawned.
    #[error("failed to run `{command}`: {error}")]
    CommandFailed {
        /// Program name.
        command: String,
        /// Spawn error.
        #[source]
        error: io::Error,
    },

    /// A child process exited unsuccessfully.
    #[error("`{command}` exited with {status}\n{stderr}")]
    ProcessFailed {
        /// Program name.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// No interpreter was found on the host.
    #[error("no Python runtime found: {0}")]
    RuntimeNotFound(String),

    /// The interpreter version is outside the supported range.
    #[error("unsupported Python runtime {detected} at {}: required {required}", path.display())]
    UnsupportedRuntime {
        /// Detected version string.
        detected: String,
        /// Required version range.
        required: String,
        /// Interpreter that was probed.
        path: PathBuf,
    },

    /// The interpreter could not be queried.
    #[error("failed to probe Python runtime: {0}")]
    RuntimeProbe(String),

    /// The dependency installer exited unsuccessfully.
    #[error("dependency installer failed ({status}):\n{stderr}")]
    InstallerFailed {
        /// Exit status description.
        status: String,
        /// Installer stderr, verbatim.
        stderr: String,
    },

    /// Two distributions provide the same top-level module.
    #[error("top-level module `{module}` is provided by both `{first}` and `{second}`")]
    ModuleConflict {
        /// Contested module name.
        module: String,
        /// First claiming distribution.
        first: String,
        /// Second claiming distribution.
        second: String,
    },

    /// A package is listed as both keep and drop.
    #[error("packages listed in both keep and drop overrides: {}", names.join(", "))]
    OverrideConflict {
        /// Normalized names in both sets.
        names: Vec<String>,
    },

    /// The entry reference is malformed or cannot be resolved.
    #[error("invalid entry point `{entry}`: {reason}")]
    InvalidEntryPoint {
        /// Raw entry reference.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A module failed to compile to bytecode.
    #[error("failed to compile {}: {message}", path.display())]
    CompileFailed {
        /// Source file or chunk root.
        path: PathBuf,
        /// Compiler output.
        message: String,
    },

    /// An external tool needed by the requested format is not installed.
    #[error("`{tool}` is required for the {format} format but was not found in PATH")]
    MissingTool {
        /// Missing program.
        tool: String,
        /// Format that required it.
        format: String,
    },

    /// The output path already exists and overwriting was not requested.
    #[error("output already exists: {} (pass --force to replace it)", .0.display())]
    OutputExists(PathBuf),

    /// Another build holds the lock for the output path.
    #[error("another build is writing to {}", .0.display())]
    OutputLocked(PathBuf),

    /// The build was interrupted.
    #[error("build cancelled")]
    Cancelled,

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Template registration error.
    #[error("template error: {0}")]
    TemplateParse(#[from] Box<handlebars::TemplateError>),

    /// Zip archive error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Glob pattern error.
    #[error("pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// Path prefix error.
    #[error("path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Context(_, inner) => inner.exit_code(),
            Self::ModuleConflict { .. }
            | Self::OverrideConflict { .. }
            | Self::InvalidEntryPoint { .. } => 2,
            Self::RuntimeNotFound(_) | Self::UnsupportedRuntime { .. } | Self::RuntimeProbe(_) => {
                11
            }
            Self::OutputExists(_) | Self::OutputLocked(_) => 12,
            Self::InstallerFailed { .. } => 13,
            Self::MissingTool { .. } => 21,
            Self::Cancelled => 130,
            _ => 20,
        }
    }

    /// Innermost error, skipping context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context(_, inner) => inner.root(),
            other => other,
        }
    }
}

/// Attach a path and description to I/O results.
pub trait ErrorExt<T> {
    /// Convert the I/O error into [`Error::Fs`].
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Prepend human context to errors and turn `None` into errors.
pub trait Context<T> {
    /// Add static context.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add lazily computed context.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Return early with a [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_preserves_exit_code_of_inner_error() {
        let err: Result<()> = Err(Error::OverrideConflict {
            names: vec!["fastapi".into()],
        });
        let err = err.context("planning prune").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(matches!(err.root(), Error::OverrideConflict { .. }));
        assert!(err.to_string().starts_with("planning prune: "));
    }

    #[test]
    fn fs_context_names_the_path() {
        let io: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = io.fs_context("reading", "/tmp/missing").unwrap_err();
        assert_eq!(err.to_string(), "reading /tmp/missing: gone");
    }
}
