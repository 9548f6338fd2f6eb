//! SquashFS format: a compressed read-only image built with `mksquashfs`.

use crate::bundler::{
    builder::tool_detection::MKSQUASHFS,
    error::{Error, Result},
};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Path to `mksquashfs`, or [`Error::MissingTool`].
pub fn ensure_available() -> Result<PathBuf> {
    MKSQUASHFS.clone().ok_or_else(|| Error::MissingTool {
        tool: "mksquashfs".into(),
        format: "squashfs".into(),
    })
}

/// Builds an image of `tree` at `dest`.
pub async fn package(tree: &Path, dest: &Path) -> Result<()> {
    let tool = ensure_available()?;
    let args = image_args(tree, dest);
    log::debug!("Running {} {:?}", tool.display(), args);

    let output = Command::new(&tool)
        .args(&args)
        .output()
        .await
        .map_err(|error| Error::CommandFailed {
            command: "mksquashfs".into(),
            error,
        })?;

    if !output.status.success() {
        return Err(Error::ProcessFailed {
            command: "mksquashfs".into(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

fn image_args(tree: &Path, dest: &Path) -> Vec<std::ffi::OsString> {
    let mut args: Vec<std::ffi::OsString> = vec![tree.into(), dest.into()];
    for flag in ["-noappend", "-all-root", "-comp", "xz", "-b", "1048576"] {
        args.push(flag.into());
    }
    args
}
