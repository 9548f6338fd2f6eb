//! Packagers.
//!
//! One strategy per [`OutputFormat`], all consuming a finished bundle tree:
//!
//! - [`directory`] - the tree itself is the artifact
//! - [`singlefile`] - tar+gzip, or zip for `.zip` outputs
//! - [`squashfs`] - read-only image built by `mksquashfs`
//! - [`executable`] - native stub with the tree appended as a payload
//!
//! Every strategy writes to a scratch destination next to the final path; the
//! orchestrator promotes it with a rename once packaging succeeded.

pub mod directory;
pub mod executable;
pub mod singlefile;
pub mod squashfs;

use crate::bundler::{error::Result, settings::OutputFormat};
use std::path::{Path, PathBuf};

/// The final output of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifact {
    /// Format that produced it.
    pub format: OutputFormat,
    /// Final location.
    pub path: PathBuf,
    /// Size in bytes (sum of regular files for directories).
    pub size: u64,
    /// Hex SHA-256 of the file, or of the tree for directories.
    pub checksum: String,
}

/// Final artifact path for `format` given the requested output path.
///
/// - singlefile: `.zip` stays as is; otherwise `.tar.gz` is appended unless
///   the name already ends in `.tar.gz` or `.tgz`
/// - squashfs: `.squashfs` is appended when there is no extension
/// - executable: `.exe` is appended for Windows runtimes
pub fn artifact_path(format: OutputFormat, output: &Path, windows: bool) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let with_suffix = |suffix: &str| output.with_file_name(format!("{name}{suffix}"));

    match format {
        OutputFormat::Directory => output.to_path_buf(),
        OutputFormat::SingleFile => {
            if singlefile::is_zip(output) || name.ends_with(".tar.gz") || name.ends_with(".tgz") {
                output.to_path_buf()
            } else {
                with_suffix(".tar.gz")
            }
        }
        OutputFormat::SquashFs => {
            if output.extension().is_some() {
                output.to_path_buf()
            } else {
                with_suffix(".squashfs")
            }
        }
        OutputFormat::Executable => {
            if windows && !name.to_ascii_lowercase().ends_with(".exe") {
                with_suffix(".exe")
            } else {
                output.to_path_buf()
            }
        }
    }
}

/// Fails early when `format` needs something the host lacks.
pub fn preflight(format: OutputFormat, stub: Option<&Path>) -> Result<()> {
    match format {
        OutputFormat::SquashFs => squashfs::ensure_available().map(|_| ()),
        OutputFormat::Executable => executable::resolve_stub(stub).map(|_| ()),
        OutputFormat::Directory | OutputFormat::SingleFile => Ok(()),
    }
}

/// Packages the bundle `tree` into `dest` (a not-yet-existing scratch path).
///
/// `name` is the final artifact's file name, used for format detection and
/// as the archive's top-level directory.
pub async fn package(
    format: OutputFormat,
    tree: &Path,
    dest: &Path,
    name: &str,
    stub: Option<&Path>,
) -> Result<()> {
    log::info!("Packaging {format} artifact");
    match format {
        OutputFormat::Directory => directory::package(tree, dest).await,
        OutputFormat::SingleFile => singlefile::package(tree, dest, name).await,
        OutputFormat::SquashFs => squashfs::package(tree, dest).await,
        OutputFormat::Executable => executable::package(tree, dest, stub).await,
    }
}
