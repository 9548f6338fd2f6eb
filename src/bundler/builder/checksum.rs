//! Artifact checksums.
//!
//! Single files hash their bytes. Directory bundles hash every regular file's
//! relative path and content in sorted order, so the digest is stable across
//! hosts and walk orders.

use crate::{
    bail,
    bundler::{Result, error::ErrorExt},
};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Hex SHA-256 of a file or directory tree.
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading artifact metadata", path)?;

    let path = path.to_path_buf();
    if metadata.is_file() {
        tokio::task::spawn_blocking(move || file_sha256(&path)).await?
    } else if metadata.is_dir() {
        tokio::task::spawn_blocking(move || directory_sha256(&path)).await?
    } else {
        bail!("Path is neither file nor directory: {}", path.display())
    }
}

/// Hex SHA-256 of a single file.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path).fs_context("opening file for hashing", path)?;
    std::io::copy(&mut file, &mut hasher).fs_context("reading file for hashing", path)?;
    Ok(hex::encode(hasher.finalize()))
}

fn directory_sha256(dir: &Path) -> Result<String> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut hasher = Sha256::new();
    for path in files {
        let rel = path.strip_prefix(dir)?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        hasher.update(name.as_bytes());
        hasher.update([0]);
        let mut file = File::open(&path).fs_context("opening file for hashing", &path)?;
        std::io::copy(&mut file, &mut hasher).fs_context("reading file for hashing", &path)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_digest_matches_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            calculate_sha256(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn directory_digest_depends_on_names_and_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/x"), "1").unwrap();
        let first = calculate_sha256(dir.path()).await.unwrap();
        assert_eq!(first, calculate_sha256(dir.path()).await.unwrap());

        std::fs::rename(dir.path().join("sub/x"), dir.path().join("sub/y")).unwrap();
        assert_ne!(first, calculate_sha256(dir.path()).await.unwrap());
    }
}
