//! Core BuildContext struct and implementations.

use super::{EntryPoint, OutputFormat};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Independently switchable pipeline behaviours.
///
/// Every toggle defaults to `true`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Toggles {
    /// Remove distributions no reachable module belongs to.
    pub prune_unused: bool,
    /// Strip low-value files and compile bytecode.
    pub optimize: bool,
    /// Write `bundle.pyz` and put it first on the module search path.
    pub zip_imports: bool,
    /// Delete `.py` sources once their bytecode exists.
    pub strip_sources: bool,
    /// Write the static metadata snapshot.
    pub freeze_metadata: bool,
    /// Block installer imports at runtime.
    pub block_packaging: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            prune_unused: true,
            optimize: true,
            zip_imports: true,
            strip_sources: true,
            freeze_metadata: true,
            block_packaging: true,
        }
    }
}

/// Immutable configuration for one build.
///
/// Constructed via [`BuildContextBuilder`](super::BuildContextBuilder), which
/// validates the entry point, the project root and the keep/drop overrides.
///
/// # Examples
///
/// ```no_run
/// use shrinkwrap::bundler::{BuildContextBuilder, OutputFormat};
///
/// # fn example() -> shrinkwrap::bundler::Result<()> {
/// let ctx = BuildContextBuilder::new()
///     .project_root(".")
///     .entry("app.main:app")
///     .output("dist/app")
///     .format(OutputFormat::Directory)
///     .build()?;
/// assert_eq!(ctx.entry().module(), "app.main");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BuildContext {
    /// Absolute project root.
    project_root: PathBuf,

    /// Application entry reference.
    entry: EntryPoint,

    /// Absolute output path.
    output: PathBuf,

    /// Artifact container format.
    format: OutputFormat,

    /// Explicit interpreter.
    python: Option<PathBuf>,

    /// Pre-resolved dependency directory; skips the installer when set.
    site_packages: Option<PathBuf>,

    /// Requirement specifiers for the installer.
    requirements: Vec<String>,

    /// Normalized names force-kept (user keep list plus server packages).
    keep: BTreeSet<String>,

    /// Module the launcher runs with `python -m`.
    server_module: String,

    /// Normalized names force-removed.
    drop: BTreeSet<String>,

    /// Behaviour switches.
    toggles: Toggles,

    /// Stub binary for the executable format.
    stub: Option<PathBuf>,

    /// Replace an existing output instead of failing.
    force: bool,
}

impl BuildContext {
    /// Returns the project root.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Returns the entry reference.
    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    /// Returns the output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Returns the output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Returns the explicit interpreter, if any.
    pub fn python(&self) -> Option<&Path> {
        self.python.as_deref()
    }

    /// Returns the pre-resolved dependency directory, if any.
    pub fn site_packages(&self) -> Option<&Path> {
        self.site_packages.as_deref()
    }

    /// Returns the requirement specifiers.
    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    /// Returns the normalized keep-override set.
    pub fn keep(&self) -> &BTreeSet<String> {
        &self.keep
    }

    /// Returns the module the launcher starts, derived from the first server
    /// package.
    pub fn server_module(&self) -> &str {
        &self.server_module
    }

    /// Returns the normalized drop-override set.
    pub fn drop_set(&self) -> &BTreeSet<String> {
        &self.drop
    }

    /// Returns the toggles.
    pub fn toggles(&self) -> Toggles {
        self.toggles
    }

    /// Returns the stub binary override.
    pub fn stub(&self) -> Option<&Path> {
        self.stub.as_deref()
    }

    /// Returns whether an existing output is replaced.
    pub fn force(&self) -> bool {
        self.force
    }

    /// Creates a new BuildContext (used by BuildContextBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        project_root: PathBuf,
        entry: EntryPoint,
        output: PathBuf,
        format: OutputFormat,
        python: Option<PathBuf>,
        site_packages: Option<PathBuf>,
        requirements: Vec<String>,
        keep: BTreeSet<String>,
        server_module: String,
        drop: BTreeSet<String>,
        toggles: Toggles,
        stub: Option<PathBuf>,
        force: bool,
    ) -> Self {
        Self {
            project_root,
            entry,
            output,
            format,
            python,
            site_packages,
            requirements,
            keep,
            server_module,
            drop,
            toggles,
            stub,
            force,
        }
    }
}
