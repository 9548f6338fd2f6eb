//! Builder for constructing BuildContext.

use super::{BuildContext, DEFAULT_SERVER_PACKAGES, EntryPoint, OutputFormat, Toggles, is_identifier};
use crate::bundler::{
    deps::normalize_name,
    error::{Context, Error, ErrorExt, Result},
};
use path_absolutize::Absolutize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Builder for constructing [`BuildContext`].
///
/// Provides a fluent API; all validation happens in [`build`](Self::build),
/// before any filesystem mutation.
///
/// # Examples
///
/// ```no_run
/// use shrinkwrap::bundler::BuildContextBuilder;
///
/// # fn example() -> shrinkwrap::bundler::Result<()> {
/// let ctx = BuildContextBuilder::new()
///     .project_root("examples/hello")
///     .entry("app.main:app")
///     .keep_packages(["jinja2"])
///     .drop_packages(["pytest"])
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct BuildContextBuilder {
    project_root: Option<PathBuf>,
    entry: Option<String>,
    output: Option<PathBuf>,
    format: OutputFormat,
    python: Option<PathBuf>,
    site_packages: Option<PathBuf>,
    requirements: Vec<String>,
    keep: Vec<String>,
    drop: Vec<String>,
    server_packages: Option<Vec<String>>,
    toggles: Toggles,
    stub: Option<PathBuf>,
    force: bool,
}

impl BuildContextBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the project root.
    ///
    /// Default: current directory
    pub fn project_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.project_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the entry reference (`module:attribute`).
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Sets the output path, relative paths resolve against the project root.
    ///
    /// Default: `dist/app`
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the output format.
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets an explicit interpreter.
    pub fn python(mut self, python: Option<PathBuf>) -> Self {
        self.python = python;
        self
    }

    /// Uses an already-resolved dependency directory instead of the installer.
    pub fn site_packages(mut self, dir: Option<PathBuf>) -> Self {
        self.site_packages = dir;
        self
    }

    /// Sets the requirement specifiers handed to the installer.
    pub fn requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }

    /// Adds keep-override names.
    pub fn keep_packages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds drop-override names.
    pub fn drop_packages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drop.extend(names.into_iter().map(Into::into));
        self
    }

    /// Replaces the server packages. All are force-kept; the first one is the
    /// module the launcher runs.
    ///
    /// Default: [`DEFAULT_SERVER_PACKAGES`]
    pub fn server_packages(mut self, names: Vec<String>) -> Self {
        self.server_packages = Some(names);
        self
    }

    /// Sets all toggles.
    pub fn toggles(mut self, toggles: Toggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Sets the stub binary for the executable format.
    pub fn stub(mut self, stub: Option<PathBuf>) -> Self {
        self.stub = stub;
        self
    }

    /// Replace an existing output instead of failing.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEntryPoint`] for a malformed or missing entry
    /// - [`Error::OverrideConflict`] when a name is in both keep and drop
    /// - an I/O error when the project root is missing or not a directory
    pub fn build(self) -> Result<BuildContext> {
        let entry: EntryPoint = self
            .entry
            .ok_or_else(|| Error::InvalidEntryPoint {
                entry: String::new(),
                reason: "an entry point is required".into(),
            })?
            .parse()?;

        let project_root = match self.project_root {
            Some(root) => root,
            None => std::env::current_dir().fs_context("reading current directory", ".")?,
        };
        let project_root = absolute(&project_root)?;
        let meta = std::fs::metadata(&project_root)
            .fs_context("reading project root", &project_root)?;
        if !meta.is_dir() {
            crate::bail!("project root is not a directory: {}", project_root.display());
        }

        let output = self.output.unwrap_or_else(|| PathBuf::from("dist/app"));
        let output = if output.is_absolute() {
            absolute(&output)?
        } else {
            absolute(&project_root.join(output))?
        };
        if output == project_root || project_root.starts_with(&output) {
            crate::bail!(
                "output {} would overwrite the project root",
                output.display()
            );
        }

        let user_keep: BTreeSet<String> = self.keep.iter().map(|n| normalize_name(n)).collect();
        let drop: BTreeSet<String> = self.drop.iter().map(|n| normalize_name(n)).collect();

        let conflicts: Vec<String> = user_keep.intersection(&drop).cloned().collect();
        if !conflicts.is_empty() {
            return Err(Error::OverrideConflict { names: conflicts });
        }

        let server = self.server_packages.unwrap_or_else(|| {
            DEFAULT_SERVER_PACKAGES
                .iter()
                .map(|s| s.to_string())
                .collect()
        });
        let server_module = server
            .first()
            .map(|name| name.trim().replace(['-', '.'], "_").to_lowercase())
            .filter(|module| is_identifier(module))
            .ok_or_else(|| {
                Error::GenericError(format!(
                    "server packages must start with an importable package name, got {server:?}"
                ))
            })?;
        let mut keep = user_keep;
        for name in server.iter().map(|n| normalize_name(n)) {
            if drop.contains(&name) {
                log::warn!("server package `{name}` is dropped by override; the launcher may fail");
                continue;
            }
            keep.insert(name);
        }

        let site_packages = self
            .site_packages
            .map(|p| absolute(&p))
            .transpose()
            .context("resolving --site-packages")?;

        Ok(BuildContext::new(
            project_root,
            entry,
            output,
            self.format,
            self.python,
            site_packages,
            self.requirements,
            keep,
            server_module,
            drop,
            self.toggles,
            self.stub,
            self.force,
        ))
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .fs_context("resolving path", path)?
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn conflicting_overrides_are_rejected() {
        let dir = project();
        let err = BuildContextBuilder::new()
            .project_root(dir.path())
            .entry("app.main:app")
            .keep_packages(["Typing_Extensions"])
            .drop_packages(["typing-extensions", "pytest"])
            .build()
            .unwrap_err();
        match err {
            Error::OverrideConflict { names } => assert_eq!(names, vec!["typing-extensions"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn server_packages_are_kept_unless_dropped() {
        let dir = project();
        let ctx = BuildContextBuilder::new()
            .project_root(dir.path())
            .entry("app.main:app")
            .build()
            .unwrap();
        assert!(ctx.keep().contains("uvicorn"));
        assert_eq!(ctx.output(), dir.path().join("dist/app"));

        let ctx = BuildContextBuilder::new()
            .project_root(dir.path())
            .entry("app.main:app")
            .drop_packages(["uvicorn"])
            .build()
            .unwrap();
        assert!(!ctx.keep().contains("uvicorn"));
        assert!(ctx.drop_set().contains("uvicorn"));
    }

    #[test]
    fn first_server_package_names_the_launched_module() {
        let dir = project();
        let ctx = BuildContextBuilder::new()
            .project_root(dir.path())
            .entry("app.main:app")
            .build()
            .unwrap();
        assert_eq!(ctx.server_module(), "uvicorn");

        let ctx = BuildContextBuilder::new()
            .project_root(dir.path())
            .entry("app.main:app")
            .server_packages(vec!["Granian".into(), "uvloop".into()])
            .build()
            .unwrap();
        assert_eq!(ctx.server_module(), "granian");
        assert!(ctx.keep().contains("granian") && ctx.keep().contains("uvloop"));
        assert!(!ctx.keep().contains("uvicorn"));

        let err = BuildContextBuilder::new()
            .project_root(dir.path())
            .entry("app.main:app")
            .server_packages(Vec::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("server packages"));
    }

    #[test]
    fn output_may_not_contain_the_project() {
        let dir = project();
        let err = BuildContextBuilder::new()
            .project_root(dir.path().join("."))
            .entry("app.main:app")
            .output(dir.path())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("project root"));
    }
}
