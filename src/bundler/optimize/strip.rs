//! Low-value file removal.

use super::OptimizeStats;
use crate::bundler::{
    error::{ErrorExt, Result},
    layout::BundleLayout,
    utils::fs::dir_size,
};
use std::path::{Path, PathBuf};

/// Glob relative to a base directory; `dirs_only` ignores matching files.
struct Rule {
    pattern: &'static str,
    dirs_only: bool,
}

const fn dirs(pattern: &'static str) -> Rule {
    Rule {
        pattern,
        dirs_only: true,
    }
}

const fn any(pattern: &'static str) -> Rule {
    Rule {
        pattern,
        dirs_only: false,
    }
}

const SITE_PACKAGES_RULES: &[Rule] = &[
    dirs("**/__pycache__"),
    // test suites
    dirs("**/tests"),
    dirs("**/test"),
    // documentation
    dirs("**/docs"),
    dirs("**/examples"),
    dirs("**/example"),
    dirs("**/benchmark*"),
    any("**/LICENSE*"),
    any("**/COPYING*"),
    any("**/NOTICE*"),
    any("**/README*"),
    any("**/*.md"),
    any("**/*.rst"),
    // typing-only
    any("**/*.pyi"),
    any("**/py.typed"),
    // packaging toolchain
    any("pip"),
    any("setuptools"),
    any("wheel"),
    any("_distutils_hack"),
    any("pkg_resources"),
    any("distutils-precedence.pth"),
    dirs("pip-*.dist-info"),
    dirs("setuptools-*.dist-info"),
    dirs("wheel-*.dist-info"),
];

const APP_RULES: &[Rule] = &[
    dirs("**/__pycache__"),
    dirs("dist"),
    dirs("build"),
    dirs("*.egg-info"),
];

/// Deletes test suites, docs, type stubs and packaging tools from
/// `site-packages`, and stale caches and build output from the application.
pub fn strip_low_value(layout: &BundleLayout) -> Result<OptimizeStats> {
    let mut targets = matches(&layout.site_packages(), SITE_PACKAGES_RULES)?;
    targets.extend(matches(&layout.app_dir(), APP_RULES)?);
    remove_all(targets)
}

fn matches(base: &Path, rules: &[Rule]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !base.is_dir() {
        return Ok(found);
    }
    let escaped = glob::Pattern::escape(&base.to_string_lossy());
    for rule in rules {
        let pattern = format!("{escaped}/{}", rule.pattern);
        for path in glob::glob(&pattern)?.filter_map(|p| p.ok()) {
            if rule.dirs_only && !path.is_dir() {
                continue;
            }
            found.push(path);
        }
    }
    Ok(found)
}

/// Removes `targets`, shallowest first, skipping anything already gone with
/// an ancestor.
fn remove_all(mut targets: Vec<PathBuf>) -> Result<OptimizeStats> {
    targets.sort_by_key(|p| (p.components().count(), p.clone()));
    targets.dedup();

    let mut stats = OptimizeStats::default();
    let mut removed: Vec<PathBuf> = Vec::new();

    for path in targets {
        if removed.iter().any(|r| path.starts_with(r)) {
            continue;
        }
        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.is_dir() {
            stats.bytes_reclaimed += dir_size(&path);
            std::fs::remove_dir_all(&path).fs_context("removing directory", &path)?;
            stats.dirs_removed += 1;
        } else {
            stats.bytes_reclaimed += meta.len();
            std::fs::remove_file(&path).fs_context("removing", &path)?;
            stats.files_removed += 1;
        }
        log::trace!("stripped {}", path.display());
        removed.push(path);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn strips_low_value_files_but_keeps_code() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path(), false, "3.12");
        let site = layout.site_packages();
        let app = layout.app_dir();

        for rel in [
            "fastapi/__init__.py",
            "fastapi/tests/test_app.py",
            "fastapi/docs/index.md",
            "fastapi/routing.pyi",
            "fastapi/py.typed",
            "fastapi-0.111.0.dist-info/METADATA",
            "fastapi-0.111.0.dist-info/LICENSE",
            "pip/__init__.py",
            "pip-24.0.dist-info/RECORD",
            "testing_utils/__init__.py",
        ] {
            let path = site.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
        fs::create_dir_all(app.join("build/lib")).unwrap();
        fs::write(app.join("build/lib/old.py"), "x").unwrap();
        fs::write(app.join("main.py"), "x").unwrap();

        let stats = strip_low_value(&layout).unwrap();

        assert!(site.join("fastapi/__init__.py").is_file());
        assert!(site.join("fastapi-0.111.0.dist-info/METADATA").is_file());
        assert!(site.join("testing_utils/__init__.py").is_file());
        assert!(!site.join("fastapi/tests").exists());
        assert!(!site.join("fastapi/docs").exists());
        assert!(!site.join("fastapi/routing.pyi").exists());
        assert!(!site.join("fastapi/py.typed").exists());
        assert!(!site.join("fastapi-0.111.0.dist-info/LICENSE").exists());
        assert!(!site.join("pip").exists());
        assert!(!site.join("pip-24.0.dist-info").exists());
        assert!(!app.join("build").exists());
        assert!(app.join("main.py").is_file());

        assert_eq!(stats.dirs_removed, 5);
        assert_eq!(stats.files_removed, 3);
        assert!(stats.bytes_reclaimed >= 8);
    }

    #[test]
    fn missing_trees_strip_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path(), false, "3.12");
        assert_eq!(strip_low_value(&layout).unwrap(), OptimizeStats::default());
    }
}
