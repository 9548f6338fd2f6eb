//! Pruner.
//!
//! Maps reachable module names back to their owning distributions and deletes
//! every distribution outside the retained set from the staged
//! `site-packages`. Overrides always win: drop beats reachability and keep
//! beats non-reachability.

use crate::bundler::{
    deps::{DistributionIndex, normalize_name},
    error::{Error, Result},
    utils::fs::{dir_size, remove_path},
};
use std::collections::BTreeSet;
use std::path::Path;

/// Outcome of [`plan`]: which distributions stay and which go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    /// Normalized keys of retained distributions.
    pub retained: BTreeSet<String>,
    /// Normalized keys of distributions to delete.
    pub removed: BTreeSet<String>,
}

/// One deleted distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedDistribution {
    /// Display name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Bytes freed on disk.
    pub bytes: u64,
}

/// Diagnostics emitted by [`apply`].
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// Deleted distributions, by name.
    pub removed: Vec<RemovedDistribution>,
    /// Retained distribution names.
    pub retained: Vec<String>,
}

impl PruneReport {
    /// Sum of reclaimed bytes.
    pub fn reclaimed_bytes(&self) -> u64 {
        self.removed.iter().map(|r| r.bytes).sum()
    }
}

/// Distributions whose provided modules intersect `reachable`, plus `keep`,
/// minus `drop`. All names are compared normalized.
pub fn retained_set(
    index: &DistributionIndex,
    reachable: &BTreeSet<&str>,
    keep: &BTreeSet<String>,
    drop: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut retained: BTreeSet<String> = index
        .iter()
        .filter(|(_, dist)| dist.top_level().iter().any(|m| reachable.contains(m.as_str())))
        .map(|(key, _)| key.clone())
        .collect();

    for name in keep {
        let key = normalize_name(name);
        if index.get(&key).is_some() {
            retained.insert(key);
        } else {
            log::warn!("kept package `{name}` is not installed");
        }
    }
    for name in drop {
        retained.remove(&normalize_name(name));
    }
    retained
}

/// Computes the prune plan and validates it before anything is deleted.
///
/// With `prune_unused` off every distribution is retained except the dropped
/// ones.
pub fn plan(
    index: &DistributionIndex,
    reachable: &BTreeSet<&str>,
    keep: &BTreeSet<String>,
    drop: &BTreeSet<String>,
    prune_unused: bool,
) -> Result<PrunePlan> {
    let both: Vec<String> = keep.intersection(drop).cloned().collect();
    if !both.is_empty() {
        return Err(Error::OverrideConflict { names: both });
    }

    let retained = if prune_unused {
        retained_set(index, reachable, keep, drop)
    } else {
        let mut all = index.keys();
        for name in drop {
            all.remove(&normalize_name(name));
        }
        all
    };

    for name in drop {
        if index.get(name).is_none() {
            log::debug!("dropped package `{name}` is not installed");
        }
    }

    index.check_conflicts(&retained)?;

    let removed = index.keys().difference(&retained).cloned().collect();
    Ok(PrunePlan { retained, removed })
}

/// Deletes every distribution in `plan.removed` from the index root.
///
/// Running it again over an already-pruned tree deletes nothing further.
pub fn apply(index: &DistributionIndex, plan: &PrunePlan) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    for key in &plan.removed {
        let Some(dist) = index.get(key) else {
            continue;
        };
        let paths = index.removal_paths(key);
        let bytes: u64 = paths.iter().map(|p| dir_size(p)).sum();
        for path in &paths {
            remove_path(path)?;
            if let Some(parent) = path.parent() {
                remove_empty_parents(parent, index.root());
            }
        }
        log::debug!("Pruned {} {} ({bytes} bytes)", dist.name(), dist.version());
        report.removed.push(RemovedDistribution {
            name: dist.name().to_string(),
            version: dist.version().to_string(),
            bytes,
        });
    }

    report.retained = plan
        .retained
        .iter()
        .filter_map(|k| index.get(k).map(|d| d.name().to_string()))
        .collect();

    log::info!(
        "Pruned {} distributions, retained {}",
        report.removed.len(),
        report.retained.len()
    );
    Ok(report)
}

/// Removes now-empty directories between `dir` and `root` (exclusive).
fn remove_empty_parents(dir: &Path, root: &Path) {
    let mut current = Some(dir);
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // Fails on non-empty directories, which ends the climb.
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::deps::index::tests::install;

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn retained_set_is_exactly_the_reachable_distributions() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "fastapi", "0.111.0", &["fastapi"]);
        install(site.path(), "uvicorn", "0.30.1", &["uvicorn"]);
        install(site.path(), "pytest", "8.2.2", &["pytest", "_pytest", "py"]);
        let index = DistributionIndex::scan(site.path()).unwrap();

        let reachable = BTreeSet::from(["fastapi", "json"]);
        let retained = retained_set(&index, &reachable, &set(&[]), &set(&[]));
        assert_eq!(names(&retained), ["fastapi"]);

        let retained = retained_set(&index, &BTreeSet::from(["_pytest"]), &set(&[]), &set(&[]));
        assert_eq!(names(&retained), ["pytest"]);
    }

    #[test]
    fn overrides_beat_reachability() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "fastapi", "0.111.0", &["fastapi"]);
        install(site.path(), "pytest", "8.2.2", &["pytest"]);
        let index = DistributionIndex::scan(site.path()).unwrap();

        let plan = plan(
            &index,
            &BTreeSet::from(["fastapi"]),
            &set(&["pytest"]),
            &set(&["fastapi"]),
            true,
        )
        .unwrap();
        assert_eq!(names(&plan.retained), ["pytest"]);
        assert_eq!(names(&plan.removed), ["fastapi"]);

        let report = apply(&index, &plan).unwrap();
        assert!(!site.path().join("fastapi").exists());
        assert!(site.path().join("pytest/__init__.py").exists());
        assert_eq!(report.removed[0].name, "fastapi");
    }

    #[test]
    fn override_conflict_is_reported_before_deletion() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "fastapi", "0.111.0", &["fastapi"]);
        let index = DistributionIndex::scan(site.path()).unwrap();

        let err = plan(&index, &BTreeSet::new(), &set(&["fastapi"]), &set(&["fastapi"]), true)
            .unwrap_err();
        assert!(matches!(err, Error::OverrideConflict { .. }));
        assert!(site.path().join("fastapi/__init__.py").exists());
    }

    #[test]
    fn pruning_twice_removes_nothing_more() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "fastapi", "0.111.0", &["fastapi"]);
        install(site.path(), "pytest", "8.2.2", &["pytest"]);
        std::fs::write(site.path().join("pytest/big.py"), vec![b'x'; 4096]).unwrap();

        let index = DistributionIndex::scan(site.path()).unwrap();
        let reachable = BTreeSet::from(["fastapi"]);
        let first = plan(&index, &reachable, &set(&[]), &set(&[]), true).unwrap();
        let report = apply(&index, &first).unwrap();
        assert!(report.reclaimed_bytes() >= 4096);

        let rescanned = DistributionIndex::scan(site.path()).unwrap();
        let second = plan(&rescanned, &reachable, &set(&[]), &set(&[]), true).unwrap();
        assert!(second.removed.is_empty());
        let report = apply(&rescanned, &second).unwrap();
        assert!(report.removed.is_empty());
        assert!(site.path().join("fastapi/__init__.py").exists());
    }

    #[test]
    fn disabled_pruning_keeps_everything_but_drops() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "fastapi", "0.111.0", &["fastapi"]);
        install(site.path(), "pytest", "8.2.2", &["pytest"]);
        let index = DistributionIndex::scan(site.path()).unwrap();

        let plan = plan(&index, &BTreeSet::new(), &set(&[]), &set(&["pytest"]), false).unwrap();
        assert_eq!(names(&plan.retained), ["fastapi"]);
    }
}
