//! Executable format: a native stub with the bundle appended.
//!
//! File layout:
//!
//! ```text
//! +------------------+----------------------+-------------------------------+
//! | stub executable  | payload (tar + gzip) | trailer (48 bytes)            |
//! +------------------+----------------------+-------------------------------+
//!                                           | payload length (u64, LE)      |
//!                                           | SHA-256 of the payload        |
//!                                           | magic `SHRKWRP1`              |
//! ```
//!
//! The stub is this very binary unless `--stub` names another one (for
//! example a build for the runtime's platform). At startup [`stub::stub_main`]
//! looks for a trailer; when one is present the payload is verified,
//! extracted into a content-addressed cache and the bundled launcher is run.

pub mod stub;

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    platform::singlefile::write_tar_gz,
    utils::fs::set_executable,
};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
pub use stub::{EmbeddedPayload, Trailer};

/// Top-level directory inside the payload tarball.
pub(crate) const PAYLOAD_DIR: &str = "bundle";

/// The stub to prepend: `explicit` if given, otherwise the running binary.
pub fn resolve_stub(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::current_exe().fs_context("locating current executable", "<self>")?,
    };
    let meta = std::fs::metadata(&path).fs_context("reading stub", &path)?;
    if !meta.is_file() {
        return Err(Error::GenericError(format!(
            "stub {} is not a regular file",
            path.display()
        )));
    }
    Ok(path)
}

/// Writes `stub | payload(tree) | trailer` to `dest`.
pub async fn package(tree: &Path, dest: &Path, stub: Option<&Path>) -> Result<()> {
    let stub = resolve_stub(stub)?;
    let tree = tree.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || write_executable(&tree, &dest, &stub)).await?
}

fn write_executable(tree: &Path, dest: &Path, stub: &Path) -> Result<()> {
    let scratch_dir = dest.parent().unwrap_or(Path::new("."));
    let payload = tempfile::NamedTempFile::new_in(scratch_dir).fs_context("creating temp file in", scratch_dir)?;
    write_tar_gz(tree, payload.path(), PAYLOAD_DIR)?;

    let payload_len = std::fs::metadata(payload.path())
        .fs_context("reading payload", payload.path())?
        .len();
    let mut hasher = Sha256::new();
    let mut reader = File::open(payload.path()).fs_context("reading payload", payload.path())?;
    std::io::copy(&mut reader, &mut hasher).fs_context("hashing payload", payload.path())?;
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());

    // A stub that is itself a built bundle contributes only its native part.
    let stub_len = match EmbeddedPayload::open(stub)? {
        Some(existing) => existing.offset(),
        None => std::fs::metadata(stub).fs_context("reading stub", stub)?.len(),
    };

    let mut out = BufWriter::new(File::create(dest).fs_context("creating", dest)?);
    let mut native = File::open(stub).fs_context("reading stub", stub)?.take(stub_len);
    std::io::copy(&mut native, &mut out).fs_context("writing", dest)?;
    let mut reader = File::open(payload.path()).fs_context("reading payload", payload.path())?;
    std::io::copy(&mut reader, &mut out).fs_context("writing", dest)?;
    out.write_all(&Trailer { payload_len, digest }.encode())
        .fs_context("writing", dest)?;
    out.flush().fs_context("writing", dest)?;
    drop(out);

    set_executable(dest)?;
    log::debug!(
        "Executable written: {stub_len} byte stub, {payload_len} byte payload, sha256 {}",
        hex::encode(digest)
    );
    Ok(())
}
