//! Single-file format: the bundle tree as one compressed archive.
//!
//! Entries live under a top-level directory named after the artifact
//! (`app.tar.gz` unpacks to `app/`). File modes are preserved so the launcher
//! and interpreter stay executable.

use crate::bundler::error::{ErrorExt, Result};
use flate2::{Compression, write::GzEncoder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// True for `*.zip` paths.
pub fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

/// Writes `tree` to `dest` as zip when `name` ends in `.zip`, else tar+gzip.
pub async fn package(tree: &Path, dest: &Path, name: &str) -> Result<()> {
    let tree = tree.to_path_buf();
    let dest = dest.to_path_buf();
    let prefix = top_dir(name);
    let zip = is_zip(Path::new(name));

    tokio::task::spawn_blocking(move || {
        if zip {
            write_zip(&tree, &dest, &prefix)
        } else {
            write_tar_gz(&tree, &dest, &prefix)
        }
    })
    .await?
}

/// `app.tar.gz` -> `app`
fn top_dir(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let cut = [".tar.gz", ".tgz", ".zip"]
        .iter()
        .find(|s| lower.ends_with(*s))
        .map_or(name.len(), |s| name.len() - s.len());
    let stem = &name[..cut];
    if stem.is_empty() { "bundle".into() } else { stem.to_string() }
}

/// Gzipped tarball of `tree` with every entry under `prefix`
/// (`.` for none).
pub fn write_tar_gz(tree: &Path, dest: &Path, prefix: &str) -> Result<()> {
    let file = File::create(dest).fs_context("creating", dest)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(prefix, tree)
        .fs_context("archiving", tree)?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .and_then(|mut out| out.flush())
        .fs_context("finishing", dest)?;
    Ok(())
}

fn write_zip(tree: &Path, dest: &Path, prefix: &str) -> Result<()> {
    let file = File::create(dest).fs_context("creating", dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(tree).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(tree)?;
        let mut name = prefix.to_string();
        for part in rel.components() {
            name.push('/');
            name.push_str(&part.as_os_str().to_string_lossy());
        }
        let options = base.unix_permissions(mode(&entry));

        if entry.file_type().is_symlink() {
            let target = std::fs::read_link(entry.path()).fs_context("reading link", entry.path())?;
            zip.add_symlink(name, target.to_string_lossy().into_owned(), options)?;
        } else if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path()).fs_context("reading", entry.path())?;
            std::io::copy(&mut source, &mut zip).fs_context("archiving", entry.path())?;
        }
    }
    zip.finish()?.flush().fs_context("finishing", dest)?;
    Ok(())
}

#[cfg(unix)]
fn mode(entry: &walkdir::DirEntry) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    entry
        .metadata()
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn mode(entry: &walkdir::DirEntry) -> u32 {
    if entry.file_type().is_dir() { 0o755 } else { 0o644 }
}
