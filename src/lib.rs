//! Bundle an ASGI application, its Python runtime and the dependency
//! distributions it actually imports into one redistributable artifact.
//!
//! The pipeline lives in [`bundler`]; [`cli`] and [`metadata`] provide the
//! command line front end and project discovery. The library can be driven
//! directly:
//!
//! ```no_run
//! use shrinkwrap::bundler::{BuildContextBuilder, Bundler, OutputFormat};
//!
//! # async fn example() -> shrinkwrap::Result<()> {
//! let ctx = BuildContextBuilder::new()
//!     .project_root("service")
//!     .entry("app.main:app")
//!     .format(OutputFormat::Executable)
//!     .build()?;
//! let report = Bundler::new(ctx).bundle().await?;
//! println!("{}", report.artifact.checksum);
//! # Ok(())
//! # }
//! ```

pub mod bundler;
pub mod cli;
pub mod error;
pub mod metadata;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
