//! Runtime half of the executable format.
//!
//! A built executable finds its own trailer, extracts the payload once into
//! `<cache>/<sha256>` and hands control to the bundled launcher. The cache is
//! content-addressed: a second run with the same payload reuses the tree, and
//! concurrent first runs race on a rename that only one of them wins.

use super::PAYLOAD_DIR;
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    layout::BundleLayout,
    utils::fs::remove_path,
};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Last eight bytes of every built executable.
pub const MAGIC: &[u8; 8] = b"SHRKWRP1";

/// Overrides the extraction cache directory.
pub const EXTRACT_DIR_ENV: &str = "SHRINKWRAP_EXTRACT_DIR";

/// When `1`, extract into a per-run directory that is removed on exit.
pub const EPHEMERAL_ENV: &str = "SHRINKWRAP_EPHEMERAL";

/// Fixed-size footer describing the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Payload size in bytes.
    pub payload_len: u64,
    /// SHA-256 of the payload bytes.
    pub digest: [u8; 32],
}

impl Trailer {
    /// Encoded size.
    pub const LEN: u64 = 48;

    /// `len | digest | magic`
    pub fn encode(&self) -> [u8; 48] {
        let mut out = [0u8; 48];
        out[..8].copy_from_slice(&self.payload_len.to_le_bytes());
        out[8..40].copy_from_slice(&self.digest);
        out[40..].copy_from_slice(MAGIC);
        out
    }

    /// `None` when the magic is absent.
    pub fn decode(bytes: &[u8; 48]) -> Option<Self> {
        if &bytes[40..] != MAGIC {
            return None;
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[8..40]);
        Some(Self {
            payload_len: u64::from_le_bytes(len),
            digest,
        })
    }
}

/// A payload found at the end of an executable.
#[derive(Debug, Clone)]
pub struct EmbeddedPayload {
    exe: PathBuf,
    offset: u64,
    trailer: Trailer,
}

impl EmbeddedPayload {
    /// Reads the trailer of `exe`. `Ok(None)` for plain binaries.
    pub fn open(exe: &Path) -> Result<Option<Self>> {
        let mut file = File::open(exe).fs_context("opening", exe)?;
        let len = file.metadata().fs_context("reading", exe)?.len();
        if len < Trailer::LEN {
            return Ok(None);
        }
        file.seek(SeekFrom::End(-(Trailer::LEN as i64)))
            .fs_context("seeking", exe)?;
        let mut bytes = [0u8; 48];
        file.read_exact(&mut bytes).fs_context("reading trailer of", exe)?;

        let Some(trailer) = Trailer::decode(&bytes) else {
            return Ok(None);
        };
        let Some(offset) = len
            .checked_sub(Trailer::LEN)
            .and_then(|end| end.checked_sub(trailer.payload_len))
        else {
            return Err(Error::GenericError(format!(
                "{} has a truncated payload",
                exe.display()
            )));
        };
        Ok(Some(Self {
            exe: exe.to_path_buf(),
            offset,
            trailer,
        }))
    }

    /// Start of the payload, which is also the length of the native stub.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The decoded trailer.
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    /// Hex payload digest; names the cache directory.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.trailer.digest)
    }

    fn reader(&self) -> Result<impl Read> {
        let mut file = File::open(&self.exe).fs_context("opening", &self.exe)?;
        file.seek(SeekFrom::Start(self.offset))
            .fs_context("seeking", &self.exe)?;
        Ok(BufReader::new(file).take(self.trailer.payload_len))
    }

    /// Checks the payload against the trailer digest.
    pub fn verify(&self) -> Result<()> {
        let mut hasher = Sha256::new();
        std::io::copy(&mut self.reader()?, &mut hasher).fs_context("hashing payload of", &self.exe)?;
        if hasher.finalize().as_slice() != self.trailer.digest {
            return Err(Error::GenericError(format!(
                "payload of {} is corrupt (checksum mismatch)",
                self.exe.display()
            )));
        }
        Ok(())
    }

    /// Extracts into `<cache_root>/<digest>` unless already there; returns the
    /// bundle root.
    pub fn extract(&self, cache_root: &Path) -> Result<PathBuf> {
        let target = cache_root.join(self.digest_hex());
        if BundleLayout::is_bundle_root(&target) {
            log::debug!("Reusing extracted bundle at {}", target.display());
            return Ok(target);
        }
        // Leftover from something other than a completed extraction.
        remove_path(&target)?;

        std::fs::create_dir_all(cache_root).fs_context("creating directory", cache_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(cache_root)
            .fs_context("creating temp dir in", cache_root)?;
        self.unpack_into(staging.path())?;

        match std::fs::rename(staging.path().join(PAYLOAD_DIR), &target) {
            Ok(()) => Ok(target),
            Err(_) if BundleLayout::is_bundle_root(&target) => {
                log::debug!("Another process extracted {} first", target.display());
                Ok(target)
            }
            Err(e) => Err(e).fs_context("moving extracted bundle to", &target),
        }
    }

    /// Verifies and unpacks the payload into `dir` (`dir/bundle/...`).
    pub fn unpack_into(&self, dir: &Path) -> Result<()> {
        self.verify()?;
        let mut archive = tar::Archive::new(GzDecoder::new(self.reader()?));
        archive.set_preserve_permissions(true);
        archive.unpack(dir).fs_context("extracting payload into", dir)?;
        if !BundleLayout::is_bundle_root(&dir.join(PAYLOAD_DIR)) {
            return Err(Error::GenericError(format!(
                "payload of {} holds no bundle",
                self.exe.display()
            )));
        }
        Ok(())
    }
}

/// Where payloads are extracted: `$SHRINKWRAP_EXTRACT_DIR`, else the user
/// cache directory, else the temp directory.
pub fn cache_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(EXTRACT_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(env!("CARGO_PKG_NAME"))
}

/// Runs the bundle's launcher with `args`, returning its exit code.
pub fn run_launcher(root: &Path, args: &[std::ffi::OsString]) -> Result<i32> {
    let launcher = root.join("run");
    let bat = root.join("run.bat");
    let mut command = if cfg!(windows) || (!launcher.is_file() && bat.is_file()) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&bat);
        c
    } else {
        Command::new(&launcher)
    };
    let status = command
        .args(args)
        .status()
        .map_err(|error| Error::CommandFailed {
            command: launcher.display().to_string(),
            error,
        })?;
    Ok(exit_code(status))
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Entry hook for `main`: `Some(exit code)` when this binary carries a
/// payload and ran it, `None` when it is the plain tool.
pub fn stub_main() -> Option<i32> {
    let exe = std::env::current_exe().ok()?;
    let payload = match EmbeddedPayload::open(&exe) {
        Ok(Some(payload)) => payload,
        Ok(None) => return None,
        Err(e) => {
            eprintln!("Error: {e}");
            return Some(1);
        }
    };
    let args: Vec<_> = std::env::args_os().skip(1).collect();

    let result = if std::env::var_os(EPHEMERAL_ENV).is_some_and(|v| v == "1") {
        tempfile::tempdir()
            .fs_context("creating temp dir", std::env::temp_dir())
            .and_then(|dir| {
                payload.unpack_into(dir.path())?;
                run_launcher(&dir.path().join(PAYLOAD_DIR), &args)
            })
    } else {
        payload
            .extract(&cache_root())
            .and_then(|root| run_launcher(&root, &args))
    };

    Some(result.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        1
    }))
}
