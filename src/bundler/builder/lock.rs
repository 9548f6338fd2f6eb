//! Advisory lock on an output path.
//!
//! `<output>.lock` is held for the whole build. On unix it is an exclusive
//! non-blocking `flock`; the file itself is left behind since a lock file
//! without a holder is free. Elsewhere the file is created exclusively and
//! removed when the guard drops.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Held for as long as the build runs.
pub struct OutputLock {
    #[cfg(unix)]
    _file: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
    path: PathBuf,
}

/// `<output>.lock`
pub fn lock_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    output.with_file_name(name)
}

impl OutputLock {
    /// Locks `output`, failing with [`Error::OutputLocked`] when another
    /// build holds it.
    pub fn acquire(output: &Path) -> Result<Self> {
        let path = lock_path(output);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
        }
        let file = Self::lock(&path, output)?;
        Ok(Self { _file: file, path })
    }

    #[cfg(unix)]
    fn lock(path: &Path, output: &Path) -> Result<nix::fcntl::Flock<File>> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .fs_context("opening lock file", path)?;

        let mut locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((_, Errno::EWOULDBLOCK)) => return Err(Error::OutputLocked(output.to_path_buf())),
            Err((_, errno)) => {
                return Err(std::io::Error::from(errno)).fs_context("locking", path);
            }
        };
        locked.set_len(0).fs_context("writing lock file", path)?;
        writeln!(locked, "{}", std::process::id()).fs_context("writing lock file", path)?;
        Ok(locked)
    }

    #[cfg(not(unix))]
    fn lock(path: &Path, output: &Path) -> Result<File> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id()).fs_context("writing lock file", path)?;
                Ok(file)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::OutputLocked(output.to_path_buf()))
            }
            Err(e) => Err(e).fs_context("creating lock file", path),
        }
    }

    /// Location of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for OutputLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputLock").field("path", &self.path).finish()
    }
}

#[cfg(not(unix))]
impl Drop for OutputLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::debug!("Could not remove {}: {e}", self.path.display());
        }
    }
}
