//! File system utilities for bundling.
//!
//! Provides copy, removal and atomic-write helpers with path-tagged errors.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    io::{self, Write},
    path::Path,
};

/// Removes a file, symlink or directory tree. Missing paths are ignored.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).fs_context("inspecting", path),
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context("removing", path),
    }
}

/// Recursively copies a directory, skipping every entry for which `skip`
/// returns `true` (a skipped directory is not descended into).
///
/// Symlinks are materialized: the copy holds the file or directory the link
/// points at, never the link itself. Dangling links and links that loop back
/// to an ancestor are skipped with a warning. Returns the number of regular
/// files copied.
pub fn copy_tree<F>(from: &Path, to: &Path, skip: F) -> Result<u64>
where
    F: Fn(&walkdir::DirEntry) -> bool,
{
    std::fs::create_dir_all(to).fs_context("creating directory", to)?;

    let mut copied = 0;
    let walker = walkdir::WalkDir::new(from)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !skip(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.loop_ancestor().is_some() => {
                log::warn!("skipping symlink loop at {}", e.path().unwrap_or(from).display());
                continue;
            }
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                log::warn!("skipping dangling symlink {}", e.path().unwrap_or(from).display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path).fs_context("creating directory", &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path).fs_context("copying", entry.path())?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Total size in bytes of the regular files under `path` (or of `path`
/// itself when it is a file). Missing paths count as zero.
pub fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Writes `contents` to `path` through a sibling temporary file that is renamed
/// into place, so readers never observe a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::GenericError(format!("{path:?} has no parent directory")))?;
    std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).fs_context("creating temp file in", parent)?;
    tmp.write_all(contents).fs_context("writing", tmp.path().to_path_buf())?;
    tmp.as_file()
        .sync_all()
        .fs_context("syncing", tmp.path().to_path_buf())?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .fs_context("persisting", path)?;
    Ok(())
}

/// Marks a file executable (0o755). No-op on platforms without mode bits.
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .fs_context("setting permissions on", path)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
