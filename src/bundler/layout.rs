//! Fixed on-disk layout of a bundle.
//!
//! ```text
//! <root>/
//!   .shrinkwrap-bundle.json        marker + build info
//!   run | run.bat                  launcher
//!   bundle.pyz                     optional zip of app/ and site-packages/
//!   runtime/                       interpreter, stdlib, shared library
//!   app/                           application sources
//!   site-packages/                 retained distributions
//!   meta/importlib_metadata.json   frozen metadata snapshot
//!   meta/sitecustomize.py          metadata shim and packaging guard
//! ```

use crate::bundler::runtime::RuntimeDescriptor;
use std::path::{Path, PathBuf};

/// Name of the marker file every bundle root carries.
pub const MARKER_FILE: &str = ".shrinkwrap-bundle.json";

/// Paths inside one bundle root.
#[derive(Debug, Clone)]
pub struct BundleLayout {
    root: PathBuf,
    windows: bool,
    python_version: String,
}

impl BundleLayout {
    /// Layout for a runtime of the given platform and `major.minor` version.
    pub fn new(root: impl Into<PathBuf>, windows: bool, python_version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            windows,
            python_version: python_version.into(),
        }
    }

    /// Layout matching a discovered runtime.
    pub fn for_runtime(root: impl Into<PathBuf>, runtime: &RuntimeDescriptor) -> Self {
        Self::new(root, runtime.is_windows(), runtime.major_minor())
    }

    /// True when `dir` is the root of a bundle produced by this tool.
    pub fn is_bundle_root(dir: &Path) -> bool {
        dir.join(MARKER_FILE).is_file()
    }

    /// Bundle root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True for Windows layouts.
    pub fn is_windows(&self) -> bool {
        self.windows
    }

    /// `X.Y` of the bundled interpreter.
    pub fn python_version(&self) -> &str {
        &self.python_version
    }

    /// Marker file.
    pub fn marker(&self) -> PathBuf {
        self.root.join(MARKER_FILE)
    }

    /// Runtime subtree.
    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join("runtime")
    }

    /// Interpreter binary.
    pub fn python_bin(&self) -> PathBuf {
        if self.windows {
            self.runtime_dir().join("python.exe")
        } else {
            self.runtime_dir().join("bin").join("python")
        }
    }

    /// Directory holding the shared library and the stdlib.
    pub fn lib_dir(&self) -> PathBuf {
        if self.windows {
            self.runtime_dir()
        } else {
            self.runtime_dir().join("lib")
        }
    }

    /// Standard library.
    pub fn stdlib_dir(&self) -> PathBuf {
        if self.windows {
            self.runtime_dir().join("Lib")
        } else {
            self.lib_dir().join(format!("python{}", self.python_version))
        }
    }

    /// Optional `pythonXY.zip` destination.
    pub fn stdlib_archive(&self) -> PathBuf {
        let tag = self.python_version.replace('.', "");
        self.lib_dir().join(format!("python{tag}.zip"))
    }

    /// Windows `DLLs` directory.
    pub fn dlls_dir(&self) -> PathBuf {
        self.runtime_dir().join("DLLs")
    }

    /// Application sources.
    pub fn app_dir(&self) -> PathBuf {
        self.root.join("app")
    }

    /// Retained distributions.
    pub fn site_packages(&self) -> PathBuf {
        self.root.join("site-packages")
    }

    /// Metadata directory.
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    /// Frozen metadata snapshot.
    pub fn metadata_snapshot(&self) -> PathBuf {
        self.meta_dir().join("importlib_metadata.json")
    }

    /// Runtime shim.
    pub fn sitecustomize(&self) -> PathBuf {
        self.meta_dir().join("sitecustomize.py")
    }

    /// Zip of `app/` and `site-packages/`.
    pub fn pyz(&self) -> PathBuf {
        self.root.join("bundle.pyz")
    }

    /// POSIX launcher.
    pub fn launcher(&self) -> PathBuf {
        self.root.join("run")
    }

    /// Windows launcher.
    pub fn launcher_bat(&self) -> PathBuf {
        self.root.join("run.bat")
    }

    /// Subtrees that must exist in every finished bundle.
    pub fn required_dirs(&self) -> [PathBuf; 4] {
        [
            self.runtime_dir(),
            self.app_dir(),
            self.site_packages(),
            self.meta_dir(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_and_windows_paths_differ() {
        let posix = BundleLayout::new("/b", false, "3.12");
        assert_eq!(posix.python_bin(), Path::new("/b/runtime/bin/python"));
        assert_eq!(posix.stdlib_dir(), Path::new("/b/runtime/lib/python3.12"));
        assert_eq!(posix.stdlib_archive(), Path::new("/b/runtime/lib/python312.zip"));

        let windows = BundleLayout::new("/b", true, "3.11");
        assert_eq!(windows.python_bin(), Path::new("/b/runtime/python.exe"));
        assert_eq!(windows.stdlib_dir(), Path::new("/b/runtime/Lib"));
    }
}
