//! Command line argument parsing.

use crate::bundler::settings::{OutputFormat, Toggles};
use crate::metadata::ProjectConfig;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Bundle an ASGI application into a self-contained artifact
#[derive(Parser, Debug)]
#[command(
    name = "shrinkwrap",
    version,
    about = "Bundle an ASGI application, its Python runtime and its pruned dependencies",
    long_about = "Bundles an ASGI application together with a Python runtime and only the
dependency distributions its imports reach, then packages the result as a
directory, a single archive, a squashfs image or a self-extracting executable.

Usage:
  shrinkwrap analyze --entry app.main:app
  shrinkwrap build --entry app.main:app -o dist/app
  shrinkwrap build --entry app.main:app -f executable --keep-package orjson

Settings may also come from [tool.shrinkwrap] in pyproject.toml; flags win.
Exit code 0 = artifact guaranteed to exist at the reported path."
)]
pub struct Args {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the entry reference names an application object
    Analyze(AnalyzeArgs),
    /// Build a bundle
    Build(Box<BuildArgs>),
}

/// `shrinkwrap analyze`
#[derive(ClapArgs, Debug)]
pub struct AnalyzeArgs {
    /// ASGI entry point, `module:attribute` (e.g. app.main:app)
    #[arg(short, long, value_name = "MODULE:ATTR")]
    pub entry: Option<String>,

    /// Project root
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,
}

/// `shrinkwrap build`
#[derive(ClapArgs, Debug)]
pub struct BuildArgs {
    /// ASGI entry point, `module:attribute` (e.g. app.main:app)
    #[arg(short, long, value_name = "MODULE:ATTR")]
    pub entry: Option<String>,

    /// Project root
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Output path (format suffixes such as .tar.gz are added when missing)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Python interpreter to bundle
    #[arg(long, value_name = "PYTHON", env = "SHRINKWRAP_PYTHON")]
    pub python: Option<PathBuf>,

    /// Stage this already-resolved dependency directory instead of installing
    #[arg(long, value_name = "DIR")]
    pub site_packages: Option<PathBuf>,

    /// Also install requirements-dev.txt
    #[arg(long)]
    pub dev_requirements: bool,

    /// Always retain this distribution (repeatable)
    #[arg(short = 'k', long = "keep-package", value_name = "PKG")]
    pub keep: Vec<String>,

    /// Always remove this distribution (repeatable)
    #[arg(short = 'd', long = "drop-package", value_name = "PKG")]
    pub drop: Vec<String>,

    /// Server distribution run by the launcher (repeatable; replaces the default)
    #[arg(long = "server-package", value_name = "PKG")]
    pub server: Vec<String>,

    #[command(flatten)]
    pub toggles: ToggleArgs,

    /// Stub binary for the executable format (defaults to this binary)
    #[arg(long, value_name = "PATH")]
    pub stub: Option<PathBuf>,

    /// Replace an existing output
    #[arg(long)]
    pub force: bool,
}

/// On/off pairs for every pipeline toggle. Unset pairs fall back to the
/// project config, then to the default (on).
#[derive(ClapArgs, Debug, Default)]
pub struct ToggleArgs {
    /// Strip low-value files and compile bytecode
    #[arg(long, overrides_with = "no_optimize")]
    pub optimize: bool,
    /// Leave files and sources untouched
    #[arg(long, overrides_with = "optimize")]
    pub no_optimize: bool,

    /// Remove distributions the application never imports
    #[arg(long, overrides_with = "no_prune_unused")]
    pub prune_unused: bool,
    /// Keep every installed distribution
    #[arg(long, overrides_with = "prune_unused")]
    pub no_prune_unused: bool,

    /// Put application and dependencies in bundle.pyz
    #[arg(long, overrides_with = "no_zip_imports")]
    pub zip_imports: bool,
    /// Do not write bundle.pyz
    #[arg(long, overrides_with = "zip_imports")]
    pub no_zip_imports: bool,

    /// Delete .py sources that have bytecode
    #[arg(long, overrides_with = "keep_sources")]
    pub strip_sources: bool,
    /// Keep .py sources
    #[arg(long, overrides_with = "strip_sources")]
    pub keep_sources: bool,

    /// Replace dist-info directories with a metadata snapshot
    #[arg(long, overrides_with = "no_freeze_metadata")]
    pub freeze_metadata: bool,
    /// Keep dist-info directories
    #[arg(long, overrides_with = "freeze_metadata")]
    pub no_freeze_metadata: bool,

    /// Block pip and ensurepip at runtime
    #[arg(long, overrides_with = "allow_packaging")]
    pub block_packaging: bool,
    /// Allow pip and ensurepip at runtime
    #[arg(long, overrides_with = "block_packaging")]
    pub allow_packaging: bool,
}

/// `Some(true)` / `Some(false)` when either flag of a pair was given.
fn pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (_, true) => Some(false),
        (true, false) => Some(true),
        (false, false) => None,
    }
}

impl ToggleArgs {
    /// Flags over `config` over defaults.
    pub fn resolve(&self, config: &ProjectConfig) -> Toggles {
        let defaults = Toggles::default();
        let pick = |flag: Option<bool>, configured: Option<bool>, default: bool| {
            flag.or(configured).unwrap_or(default)
        };
        Toggles {
            optimize: pick(pair(self.optimize, self.no_optimize), config.optimize, defaults.optimize),
            prune_unused: pick(
                pair(self.prune_unused, self.no_prune_unused),
                config.prune_unused,
                defaults.prune_unused,
            ),
            zip_imports: pick(
                pair(self.zip_imports, self.no_zip_imports),
                config.zip_imports,
                defaults.zip_imports,
            ),
            strip_sources: pick(
                pair(self.strip_sources, self.keep_sources),
                config.strip_sources,
                defaults.strip_sources,
            ),
            freeze_metadata: pick(
                pair(self.freeze_metadata, self.no_freeze_metadata),
                config.freeze_metadata,
                defaults.freeze_metadata,
            ),
            block_packaging: pick(
                pair(self.block_packaging, self.allow_packaging),
                config.block_packaging,
                defaults.block_packaging,
            ),
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
