//! `bundle.pyz`: the application and dependency trees as one zip on the
//! module search path.

use crate::bundler::{
    error::{ErrorExt, Result},
    layout::BundleLayout,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Native code cannot be imported from a zip.
const NATIVE_EXTENSIONS: &[&str] = &["so", "pyd", "dylib", "dll"];

/// Writes `bundle.pyz` from `app/` and `site-packages/`. Entry names are
/// relative to the bundle root (`app/...`, `site-packages/...`) so each tree
/// is importable as `bundle.pyz/app` and `bundle.pyz/site-packages`.
///
/// Returns the archive path and the number of entries.
pub fn write_pyz(layout: &BundleLayout) -> Result<(PathBuf, u64)> {
    let target = layout.pyz();
    let file = File::create(&target).fs_context("creating", &target)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0;
    for base in [layout.app_dir(), layout.site_packages()] {
        if !base.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&base).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || is_native(entry.path()) {
                continue;
            }
            let name = archive_name(entry.path().strip_prefix(layout.root())?);
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path()).fs_context("reading", entry.path())?;
            std::io::copy(&mut source, &mut zip).fs_context("archiving", entry.path())?;
            entries += 1;
        }
    }
    zip.finish()?.flush().fs_context("finishing", &target)?;

    log::debug!("Wrote {} ({entries} entries)", target.display());
    Ok((target, entries))
}

fn is_native(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| NATIVE_EXTENSIONS.contains(&e))
}

/// Forward-slash name regardless of host separator.
fn archive_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
