//! Optimizer and stripper.
//!
//! Runs on a staged tree after pruning, in this order:
//!
//! 1. delete low-value files ([`strip::strip_low_value`])
//! 2. compile every remaining source module ([`BytecodeCompiler`])
//! 3. delete sources whose bytecode exists and is non-empty
//!    ([`bytecode::strip_sources`])
//!
//! A compilation failure aborts before any source is deleted.

pub mod archive;
pub mod bytecode;
pub mod strip;

pub use archive::write_pyz;
pub use bytecode::{BytecodeCompiler, PythonCompiler};

use crate::bundler::{error::Result, layout::BundleLayout, settings::Toggles};
use std::sync::Arc;

/// Counts reported by [`optimize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    /// Files deleted.
    pub files_removed: u64,
    /// Directory trees deleted.
    pub dirs_removed: u64,
    /// Bytes freed.
    pub bytes_reclaimed: u64,
    /// Source modules compiled.
    pub modules_compiled: u64,
    /// Sources deleted after compilation.
    pub sources_stripped: u64,
}

impl OptimizeStats {
    fn absorb(&mut self, other: OptimizeStats) {
        self.files_removed += other.files_removed;
        self.dirs_removed += other.dirs_removed;
        self.bytes_reclaimed += other.bytes_reclaimed;
        self.modules_compiled += other.modules_compiled;
        self.sources_stripped += other.sources_stripped;
    }
}

/// Optimizes `layout` on the blocking pool.
pub async fn optimize(
    layout: &BundleLayout,
    toggles: Toggles,
    compiler: Arc<dyn BytecodeCompiler>,
) -> Result<OptimizeStats> {
    let layout = layout.clone();
    tokio::task::spawn_blocking(move || optimize_tree(&layout, toggles, compiler.as_ref())).await?
}

/// Synchronous body of [`optimize`].
///
/// `optimize` enables steps 1 and 2; `strip_sources` enables step 3 and,
/// since stripping needs bytecode, step 2 as well.
pub fn optimize_tree(
    layout: &BundleLayout,
    toggles: Toggles,
    compiler: &dyn BytecodeCompiler,
) -> Result<OptimizeStats> {
    let mut stats = OptimizeStats::default();

    if toggles.optimize {
        stats.absorb(strip::strip_low_value(layout)?);
        log::info!(
            "Stripped {} files and {} directories",
            stats.files_removed,
            stats.dirs_removed
        );
    }

    let roots = [layout.app_dir(), layout.site_packages()];

    if toggles.optimize || toggles.strip_sources {
        for root in &roots {
            let sources = bytecode::list_sources(root);
            compiler.compile(root, &sources)?;
            stats.modules_compiled += sources.len() as u64;
        }
        log::info!("Compiled {} modules", stats.modules_compiled);
    }

    if toggles.strip_sources {
        for root in &roots {
            let (removed, bytes) = bytecode::strip_sources(root)?;
            stats.files_removed += removed;
            stats.sources_stripped += removed;
            stats.bytes_reclaimed += bytes;
        }
        log::info!("Removed {} sources with bytecode", stats.sources_stripped);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::bytecode::tests::FakeCompiler;
    use super::*;
    use std::fs;

    fn staged() -> (tempfile::TempDir, BundleLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path(), false, "3.12");
        fs::create_dir_all(layout.app_dir().join("app")).unwrap();
        fs::write(layout.app_dir().join("app/main.py"), "import fastapi\n").unwrap();
        fs::create_dir_all(layout.site_packages().join("fastapi/tests")).unwrap();
        fs::write(layout.site_packages().join("fastapi/__init__.py"), "").unwrap();
        fs::write(layout.site_packages().join("fastapi/tests/test_x.py"), "").unwrap();
        (dir, layout)
    }

    #[test]
    fn every_module_keeps_source_or_bytecode() {
        let (_dir, layout) = staged();
        let stats = optimize_tree(&layout, Toggles::default(), &FakeCompiler).unwrap();

        assert_eq!(stats.modules_compiled, 2);
        assert_eq!(stats.sources_stripped, 2);
        assert!(layout.app_dir().join("app/main.pyc").is_file());
        assert!(!layout.app_dir().join("app/main.py").exists());
        assert!(layout.site_packages().join("fastapi/__init__.pyc").is_file());
        assert!(!layout.site_packages().join("fastapi/tests").exists());
    }

    #[test]
    fn compile_failure_leaves_sources_in_place() {
        let (_dir, layout) = staged();
        fs::write(layout.app_dir().join("app/broken.py"), "def f(:!!\n").unwrap();

        let err = optimize_tree(&layout, Toggles::default(), &FakeCompiler).unwrap_err();
        assert_eq!(err.exit_code(), 20);
        assert!(layout.app_dir().join("app/main.py").is_file());
        assert!(layout.app_dir().join("app/broken.py").is_file());
    }

    #[test]
    fn disabled_toggles_touch_nothing() {
        let (_dir, layout) = staged();
        let toggles = Toggles {
            optimize: false,
            strip_sources: false,
            ..Toggles::default()
        };
        let stats = optimize_tree(&layout, toggles, &FakeCompiler).unwrap();
        assert_eq!(stats, OptimizeStats::default());
        assert!(layout.site_packages().join("fastapi/tests/test_x.py").is_file());
        assert!(!layout.app_dir().join("app/main.pyc").exists());
    }
}
