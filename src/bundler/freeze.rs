//! Metadata Freezer.
//!
//! Serializes every retained distribution's name, version, top-level
//! packages, requirements, entry points and current file manifest into
//! `meta/importlib_metadata.json`, then removes the per-distribution metadata
//! directories the runtime would otherwise scan. The launcher's
//! `sitecustomize.py` answers `importlib.metadata` queries from the snapshot.
//!
//! Runs after every other tree mutation so the manifest matches what ships.

use crate::bundler::{
    deps::{DistributionIndex, EntryPointRecord},
    error::Result,
    layout::BundleLayout,
    utils::fs::{remove_path, write_atomic},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One snapshot record.
#[derive(Debug, Serialize)]
struct FrozenDistribution<'a> {
    name: &'a str,
    version: &'a str,
    packages: Vec<&'a str>,
    requires: &'a [String],
    entry_points: &'a [EntryPointRecord],
    files: Vec<String>,
}

/// What [`freeze`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeReport {
    /// Snapshot file.
    pub snapshot: PathBuf,
    /// Distributions recorded.
    pub distributions: usize,
}

/// Writes the snapshot for the staged `site-packages` and drops the metadata
/// directories it replaces.
///
/// Modules without metadata are left out; `importlib.metadata` could not
/// find them before freezing either.
pub fn freeze(layout: &BundleLayout) -> Result<FreezeReport> {
    let index = DistributionIndex::scan(&layout.site_packages())?;

    let mut snapshot = BTreeMap::new();
    for (key, dist) in index.iter() {
        if dist.is_synthetic() {
            continue;
        }
        let files = index
            .current_files(key)
            .iter()
            .map(|f| forward_slashes(f))
            .collect();
        snapshot.insert(
            key.as_str(),
            FrozenDistribution {
                name: dist.name(),
                version: dist.version(),
                packages: dist.top_level().iter().map(String::as_str).collect(),
                requires: dist.requires(),
                entry_points: dist.entry_points(),
                files,
            },
        );
    }

    let target = layout.metadata_snapshot();
    let json = serde_json::to_vec_pretty(&snapshot)?;
    write_atomic(&target, &json)?;

    // Only after the snapshot is durable.
    for (_, dist) in index.iter() {
        if let Some(meta) = dist.metadata_dir() {
            remove_path(&index.root().join(meta))?;
        }
    }

    log::info!("Froze metadata for {} distributions", snapshot.len());
    Ok(FreezeReport {
        snapshot: target,
        distributions: snapshot.len(),
    })
}

fn forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
