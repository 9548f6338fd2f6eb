//! Dependency installer collaborator.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often a running installer is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves, downloads and unpacks requirements into a target directory.
///
/// Implementations run on the blocking thread pool and must return
/// [`Error::Cancelled`] promptly once `cancel` fires, leaving no process
/// behind that still writes into `target`.
pub trait Installer: Send + Sync {
    /// Installs `requirements` into `target` using the interpreter `python`.
    fn install(
        &self,
        python: &Path,
        requirements: &[String],
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Runs `python -m pip install --no-compile --target <dir> <requirements...>`.
#[derive(Debug, Clone, Default)]
pub struct PipInstaller {
    extra_args: Vec<String>,
}

impl PipInstaller {
    /// Creates an installer with pip's default behaviour.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends arguments to every pip invocation (e.g. `--index-url`).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Installer for PipInstaller {
    fn install(
        &self,
        python: &Path,
        requirements: &[String],
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        std::fs::create_dir_all(target).fs_context("creating install target", target)?;

        if requirements.is_empty() {
            log::info!("No requirements to install");
            return Ok(());
        }

        log::info!("Installing {} requirement(s) with pip", requirements.len());
        log::debug!("pip target: {}", target.display());

        let command = format!("{} -m pip", python.display());
        let tmp = std::env::temp_dir();
        let mut stdout = tempfile::tempfile().fs_context("creating temp file in", &tmp)?;
        let mut stderr = tempfile::tempfile().fs_context("creating temp file in", &tmp)?;

        let mut child = Command::new(python)
            .args(["-m", "pip", "install", "--no-compile", "--disable-pip-version-check"])
            .arg("--target")
            .arg(target)
            .args(&self.extra_args)
            .args(requirements)
            .env("PYTHONNOUSERSITE", "1")
            .stdin(Stdio::null())
            .stdout(stdout.try_clone().fs_context("duplicating handle for", &tmp)?)
            .stderr(stderr.try_clone().fs_context("duplicating handle for", &tmp)?)
            .spawn()
            .map_err(|error| Error::CommandFailed {
                command: command.clone(),
                error,
            })?;

        let status = loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|error| Error::CommandFailed {
                    command: command.clone(),
                    error,
                })?
            {
                break status;
            }
            if cancel.is_cancelled() {
                log::warn!("Stopping pip (pid {})", child.id());
                if let Err(e) = child.kill() {
                    log::warn!("Failed to stop pip: {e}");
                }
                if let Err(e) = child.wait() {
                    log::warn!("Failed to reap pip: {e}");
                }
                return Err(Error::Cancelled);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stderr = read_back(&mut stderr)?;
        if !status.success() {
            return Err(Error::InstallerFailed {
                status: status.to_string(),
                stderr,
            });
        }

        log::debug!("{}", read_back(&mut stdout)?.trim_end());
        Ok(())
    }
}

/// Everything the child wrote into a captured output file.
fn read_back(file: &mut std::fs::File) -> Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut bytes))
        .fs_context("reading captured output from", std::env::temp_dir())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
