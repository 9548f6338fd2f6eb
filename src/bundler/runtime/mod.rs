//! Runtime Locator.
//!
//! Finds the host interpreter, asks it where its standard library, shared
//! library and optional `pythonXY.zip` live, and checks its version against
//! [`SUPPORTED_PYTHON`]. Discovery is read-only.

mod probe;

use crate::bundler::error::{Error, Result};
use probe::{PROBE_SCRIPT, ProbeReport};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Interpreter versions the bundle layout and launcher are known to work with.
pub const SUPPORTED_PYTHON: &str = ">=3.9, <3.14";

/// Operating system family of the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePlatform {
    /// Linux, macOS and other unixes.
    Posix,
    /// Windows.
    Windows,
}

/// Discovered facts about the host interpreter.
#[derive(Debug, Clone)]
pub struct RuntimeDescriptor {
    /// Real path of the interpreter binary (venvs resolved to their base).
    pub executable: PathBuf,
    /// Full version string as reported by the interpreter.
    pub version_string: String,
    /// Parsed `major.minor.micro`.
    pub version: semver::Version,
    /// Operating system family.
    pub platform: RuntimePlatform,
    /// Installation root (`sys.base_prefix`).
    pub root: PathBuf,
    /// Standard library directory.
    pub stdlib: PathBuf,
    /// `libpython` / `pythonXY.dll`, absent for static builds.
    pub shared_library: Option<PathBuf>,
    /// Prebuilt compressed stdlib archive.
    pub stdlib_archive: Option<PathBuf>,
    /// Windows extension module directory.
    pub dlls_dir: Option<PathBuf>,
    /// Modules compiled into the interpreter (`sys.builtin_module_names`).
    pub builtin_modules: BTreeSet<String>,
}

impl RuntimeDescriptor {
    /// `3.12`
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }

    /// `312`
    pub fn tag(&self) -> String {
        format!("{}{}", self.version.major, self.version.minor)
    }

    /// True for Windows interpreters.
    pub fn is_windows(&self) -> bool {
        self.platform == RuntimePlatform::Windows
    }
}

/// Locates and probes the interpreter.
///
/// Selection order: `explicit`, then `python3`, then `python` on `PATH`.
pub async fn locate(explicit: Option<&Path>) -> Result<RuntimeDescriptor> {
    let exe = resolve_executable(explicit)?;
    log::debug!("Probing interpreter {}", exe.display());
    let runtime = probe(&exe).await?;
    log::info!(
        "Using Python {} at {}",
        runtime.version_string,
        runtime.executable.display()
    );
    Ok(runtime)
}

fn resolve_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        // Bare names like `python3.11` go through PATH lookup.
        if path.components().count() == 1 && !path.exists() {
            return which::which(path).map_err(|e| {
                Error::RuntimeNotFound(format!("{} is not on PATH: {e}", path.display()))
            });
        }
        if !path.is_file() {
            return Err(Error::RuntimeNotFound(format!(
                "interpreter {} does not exist",
                path.display()
            )));
        }
        return Ok(path.to_path_buf());
    }

    ["python3", "python"]
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| {
            Error::RuntimeNotFound("neither `python3` nor `python` was found on PATH".into())
        })
}

/// Runs the probe script with `exe` and validates the result.
pub async fn probe(exe: &Path) -> Result<RuntimeDescriptor> {
    let output = tokio::process::Command::new(exe)
        .args(["-I", "-c", PROBE_SCRIPT])
        .output()
        .await
        .map_err(|error| Error::CommandFailed {
            command: exe.display().to_string(),
            error,
        })?;

    if !output.status.success() {
        return Err(Error::RuntimeProbe(format!(
            "{} exited with {}: {}",
            exe.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: ProbeReport = serde_json::from_str(stdout.trim())
        .map_err(|e| Error::RuntimeProbe(format!("invalid probe output: {e}")))?;

    from_report(report)
}

fn from_report(report: ProbeReport) -> Result<RuntimeDescriptor> {
    let (major, minor, patch) = report.version_info;
    let version = semver::Version::new(major, minor, patch);
    let executable = PathBuf::from(&report.executable);
    check_version(&version, &report.version, &executable)?;

    let platform = match report.platform.as_str() {
        "windows" => RuntimePlatform::Windows,
        _ => RuntimePlatform::Posix,
    };

    let stdlib = report
        .stdlib
        .map(PathBuf::from)
        .ok_or_else(|| Error::RuntimeProbe("interpreter reports no stdlib directory".into()))?;
    if !stdlib.is_dir() {
        return Err(Error::RuntimeProbe(format!(
            "stdlib directory {} does not exist",
            stdlib.display()
        )));
    }

    if report.libpython.is_none() {
        log::debug!("No shared libpython found; assuming a statically linked interpreter");
    }

    Ok(RuntimeDescriptor {
        executable,
        version_string: report.version,
        version,
        platform,
        root: PathBuf::from(report.prefix),
        stdlib,
        shared_library: report.libpython.map(PathBuf::from),
        stdlib_archive: report.stdlib_zip.map(PathBuf::from),
        dlls_dir: report.dlls_dir.map(PathBuf::from),
        builtin_modules: report.builtins.into_iter().collect(),
    })
}

/// Rejects versions outside [`SUPPORTED_PYTHON`].
pub fn check_version(version: &semver::Version, detected: &str, path: &Path) -> Result<()> {
    let required = semver::VersionReq::parse(SUPPORTED_PYTHON)
        .map_err(|e| Error::RuntimeProbe(format!("bad version requirement: {e}")))?;
    if required.matches(version) {
        return Ok(());
    }
    Err(Error::UnsupportedRuntime {
        detected: detected.to_string(),
        required: SUPPORTED_PYTHON.to_string(),
        path: path.to_path_buf(),
    })
}
