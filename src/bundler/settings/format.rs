//! Output formats.

use std::fmt;

/// Container format of the final artifact.
///
/// - **Directory**: the staging tree itself, launcher at `run`
/// - **SingleFile**: tar+gzip archive, or zip when the output ends in `.zip`
/// - **SquashFs**: read-only compressed filesystem image built by `mksquashfs`
/// - **Executable**: native stub with the bundle appended as a payload
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, clap::ValueEnum, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain directory.
    #[default]
    #[value(alias = "dir")]
    Directory,
    /// Compressed single-file archive.
    #[value(name = "singlefile", alias = "archive")]
    #[serde(alias = "archive")]
    SingleFile,
    /// Read-only filesystem image.
    #[value(name = "squashfs", alias = "image")]
    #[serde(alias = "image")]
    SquashFs,
    /// Self-extracting executable.
    #[value(alias = "exe")]
    #[serde(alias = "exe")]
    Executable,
}

impl OutputFormat {
    /// Name used on the command line and in messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::SingleFile => "singlefile",
            Self::SquashFs => "squashfs",
            Self::Executable => "executable",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
