//! Directory format: the bundle tree is moved into place unchanged.

use crate::bundler::error::{ErrorExt, Result};
use std::path::Path;

/// Moves `tree` to `dest`. Both live on the same filesystem.
pub async fn package(tree: &Path, dest: &Path) -> Result<()> {
    tokio::fs::rename(tree, dest)
        .await
        .fs_context("moving bundle to", dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tree_becomes_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("app")).unwrap();
        std::fs::write(tree.join("run"), "#!/bin/sh\n").unwrap();

        let dest = dir.path().join("out");
        package(&tree, &dest).await.unwrap();
        assert!(dest.join("run").is_file());
        assert!(dest.join("app").is_dir());
        assert!(!tree.exists());
    }
}
