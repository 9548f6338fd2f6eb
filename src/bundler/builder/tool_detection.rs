//! External tool detection.
//!
//! Looked up once per process; the squashfs packager and the preflight check
//! both consult the cached result.

use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

/// `mksquashfs` if it is in PATH and answers `-version`.
pub static MKSQUASHFS: LazyLock<Option<PathBuf>> = LazyLock::new(|| probe_tool("mksquashfs", "-version"));

/// Finds `name` in PATH and checks that it runs with `version_arg`.
fn probe_tool(name: &str, version_arg: &str) -> Option<PathBuf> {
    let path = match which::which(name) {
        Ok(path) => path,
        Err(e) => {
            log::debug!("{name} not found in PATH: {e}");
            return None;
        }
    };
    log::debug!("Found {name} at: {}", path.display());

    match Command::new(&path).arg(version_arg).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            let first = version.lines().next().unwrap_or_default();
            log::info!("{name} available: {}", first.trim());
            Some(path)
        }
        Ok(output) => {
            log::warn!(
                "{name} found at {} but {version_arg} check failed (exit code: {:?}). Stderr: {}",
                path.display(),
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
            None
        }
        Err(e) => {
            log::warn!(
                "{name} found at {} but failed to execute: {e}. Check file permissions.",
                path.display()
            );
            None
        }
    }
}
