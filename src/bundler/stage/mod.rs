//! Source Stager.
//!
//! Populates a fresh staging tree with the runtime, the application sources
//! and the resolved dependency distributions. Top-level entries are copied
//! concurrently on the blocking pool, bounded by the CPU count; each worker
//! writes a disjoint destination subtree.

use crate::bundler::{
    error::{ErrorExt, Result},
    layout::BundleLayout,
    runtime::RuntimeDescriptor,
    utils::fs::{copy_tree, set_executable},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Predicate over `(path, is_dir)`; `true` skips the entry.
type SkipFn = Arc<dyn Fn(&Path, bool) -> bool + Send + Sync>;

/// Directory names never copied from the project.
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    ".tox",
    ".nox",
    "node_modules",
];

/// Counts reported by [`stage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Application files copied.
    pub app_files: u64,
    /// Dependency files copied.
    pub dependency_files: u64,
    /// Runtime files copied.
    pub runtime_files: u64,
}

/// Copies everything a bundle needs into `layout`.
///
/// `excluded` lists absolute paths that must never be copied from the project
/// (the output path, the staging directory, the lock file, an in-project
/// dependency directory).
pub async fn stage(
    project_root: &Path,
    runtime: &RuntimeDescriptor,
    site_packages: &Path,
    layout: &BundleLayout,
    excluded: &[PathBuf],
) -> Result<StageStats> {
    for dir in layout.required_dirs() {
        tokio::fs::create_dir_all(&dir)
            .await
            .fs_context("creating directory", &dir)?;
    }

    let runtime_files = stage_runtime(runtime, layout).await?;
    log::info!("Staged runtime ({runtime_files} files)");

    let app_files = stage_application(project_root, &layout.app_dir(), excluded).await?;
    log::info!("Staged application sources ({app_files} files)");

    let dependency_files = stage_dependencies(site_packages, &layout.site_packages()).await?;
    log::info!("Staged dependencies ({dependency_files} files)");

    Ok(StageStats {
        app_files,
        dependency_files,
        runtime_files,
    })
}

/// Copies the interpreter, stdlib, shared library and optional archives.
pub async fn stage_runtime(runtime: &RuntimeDescriptor, layout: &BundleLayout) -> Result<u64> {
    let mut copied = 0;

    let python_bin = layout.python_bin();
    copy_one(&runtime.executable, &python_bin).await?;
    set_executable(&python_bin)?;
    copied += 1;

    if runtime.is_windows() {
        if let Some(exe_dir) = runtime.executable.parent() {
            let pattern = exe_dir.join("vcruntime*.dll");
            for dll in glob::glob(&pattern.to_string_lossy())?.filter_map(|p| p.ok()) {
                if let Some(name) = dll.file_name() {
                    copy_one(&dll, &layout.runtime_dir().join(name)).await?;
                    copied += 1;
                }
            }
        }
    }

    // The host's own site-packages never ships; distributions come from the
    // resolved dependency set only.
    let stdlib_root = runtime.stdlib.clone();
    let skip: SkipFn = Arc::new(move |path, is_dir| {
        is_dir
            && (path.file_name().is_some_and(|n| n == "__pycache__")
                || path == stdlib_root.join("site-packages"))
    });
    copied += copy_entries(&runtime.stdlib, &layout.stdlib_dir(), skip.clone()).await?;

    if let Some(dlls) = &runtime.dlls_dir {
        copied += copy_entries(dlls, &layout.dlls_dir(), skip).await?;
    }

    if let Some(archive) = &runtime.stdlib_archive {
        copy_one(archive, &layout.stdlib_archive()).await?;
        copied += 1;
    }

    if let Some(lib) = &runtime.shared_library {
        copied += stage_shared_library(lib, &layout.lib_dir()).await?;
    }

    Ok(copied)
}

/// Copies the shared library under its own name and, when that name is a
/// symlink, under the name of its target too (the loader looks for the
/// soname, e.g. `libpython3.12.so.1.0`).
async fn stage_shared_library(lib: &Path, lib_dir: &Path) -> Result<u64> {
    let mut names = Vec::new();
    if let Some(name) = lib.file_name() {
        names.push(name.to_os_string());
    }
    if let Ok(real) = tokio::fs::canonicalize(lib).await {
        if let Some(name) = real.file_name() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_os_string());
            }
        }
    }
    for name in &names {
        copy_one(lib, &lib_dir.join(name)).await?;
    }
    Ok(names.len() as u64)
}

/// Copies the project into `app_dir`, leaving out excluded paths, previous
/// bundles, virtual environments and VCS or cache directories.
pub async fn stage_application(project_root: &Path, app_dir: &Path, excluded: &[PathBuf]) -> Result<u64> {
    let excluded = excluded.to_vec();
    let skip: SkipFn = Arc::new(move |path, is_dir| {
        if excluded.iter().any(|ex| path.starts_with(ex)) {
            return true;
        }
        if !is_dir {
            return false;
        }
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if SKIPPED_DIRS.contains(&&*name) || name.ends_with(".egg-info") {
            return true;
        }
        if BundleLayout::is_bundle_root(path) {
            log::debug!("Skipping previous bundle at {}", path.display());
            return true;
        }
        if path.join("pyvenv.cfg").is_file() {
            log::debug!("Skipping virtual environment at {}", path.display());
            return true;
        }
        false
    });
    copy_entries(project_root, app_dir, skip).await
}

/// Copies the resolved dependency directory into the bundle.
pub async fn stage_dependencies(source: &Path, dest: &Path) -> Result<u64> {
    if !tokio::fs::try_exists(source).await.fs_context("reading", source)? {
        log::warn!("Dependency directory {} does not exist; bundling no third-party packages", source.display());
        return Ok(0);
    }
    let skip: SkipFn =
        Arc::new(|path, is_dir| is_dir && path.file_name().is_some_and(|n| n == "__pycache__"));
    copy_entries(source, dest, skip).await
}

async fn copy_one(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating directory", parent)?;
    }
    tokio::fs::copy(from, to).await.fs_context("copying", from)?;
    Ok(())
}

/// Copies each top-level entry of `src` into `dst` as an independent task.
async fn copy_entries(src: &Path, dst: &Path, skip: SkipFn) -> Result<u64> {
    tokio::fs::create_dir_all(dst)
        .await
        .fs_context("creating directory", dst)?;

    let mut read_dir = tokio::fs::read_dir(src).await.fs_context("reading", src)?;
    let permits = Arc::new(Semaphore::new(num_cpus::get().max(1)));
    let mut tasks = JoinSet::new();

    while let Some(entry) = read_dir.next_entry().await.fs_context("reading", src)? {
        let path = entry.path();
        let file_type = entry.file_type().await.fs_context("inspecting", &path)?;
        if skip(&path, file_type.is_dir()) {
            continue;
        }

        let dest = dst.join(entry.file_name());
        let skip = skip.clone();
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| crate::bundler::Error::GenericError(e.to_string()))?;

        tasks.spawn_blocking(move || {
            let _permit = permit;
            if file_type.is_dir() {
                copy_tree(&path, &dest, |e| skip(e.path(), e.file_type().is_dir()))
            } else if file_type.is_symlink() && path.is_dir() {
                // Symlinked directories are materialized.
                copy_tree(&path, &dest, |e| skip(e.path(), e.file_type().is_dir()))
            } else {
                std::fs::copy(&path, &dest).fs_context("copying", &path)?;
                Ok(1)
            }
        });
    }

    let mut copied = 0;
    while let Some(joined) = tasks.join_next().await {
        copied += joined??;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::layout::MARKER_FILE;
    use std::fs;

    #[tokio::test]
    async fn application_copy_excludes_output_and_previous_bundles() {
        let project = tempfile::tempdir().unwrap();
        let root = project.path();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/main.py"), "import fastapi\n").unwrap();
        fs::write(root.join("app/__init__.py"), "").unwrap();

        fs::create_dir_all(root.join("dist/app/app")).unwrap();
        fs::write(root.join("dist/app/app/main.py"), "").unwrap();

        fs::create_dir_all(root.join("old_bundle")).unwrap();
        fs::write(root.join("old_bundle").join(MARKER_FILE), "{}").unwrap();

        fs::create_dir_all(root.join(".venv/lib")).unwrap();
        fs::write(root.join(".venv/pyvenv.cfg"), "home = /usr/bin").unwrap();
        fs::create_dir_all(root.join("app/__pycache__")).unwrap();
        fs::write(root.join("app/__pycache__/main.cpython-312.pyc"), "").unwrap();

        let out = tempfile::tempdir().unwrap();
        let app_dir = out.path().join("app");
        let copied = stage_application(root, &app_dir, &[root.join("dist/app")])
            .await
            .unwrap();

        assert_eq!(copied, 2);
        assert!(app_dir.join("app/main.py").is_file());
        assert!(!app_dir.join("dist/app").exists());
        assert!(!app_dir.join("old_bundle").exists());
        assert!(!app_dir.join(".venv").exists());
        assert!(!app_dir.join("app/__pycache__").exists());
    }

    #[tokio::test]
    async fn missing_dependency_dir_stages_nothing() {
        let out = tempfile::tempdir().unwrap();
        let copied = stage_dependencies(&out.path().join("nope"), &out.path().join("sp"))
            .await
            .unwrap();
        assert_eq!(copied, 0);
    }
}
