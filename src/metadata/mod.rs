//! Project discovery: `[tool.shrinkwrap]` settings from `pyproject.toml` and
//! requirement specifiers from `requirements.txt`.

use crate::bundler::settings::OutputFormat;
use crate::error::{BundlerError, CliError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Requirements file read by default.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Additional requirements file read only on request.
pub const DEV_REQUIREMENTS_FILE: &str = "requirements-dev.txt";

/// The `[tool.shrinkwrap]` table. Every key is optional; command-line flags
/// take precedence over anything set here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProjectConfig {
    /// `module:attribute`
    pub entry: Option<String>,
    /// Output path, relative to the project root.
    pub output: Option<PathBuf>,
    /// Output format.
    pub format: Option<OutputFormat>,
    /// Interpreter path or name.
    pub python: Option<PathBuf>,
    /// Distributions always retained.
    #[serde(default)]
    pub keep_packages: Vec<String>,
    /// Distributions always removed.
    #[serde(default)]
    pub drop_packages: Vec<String>,
    /// Server distributions; replaces the default list when set.
    pub server_packages: Option<Vec<String>>,
    pub optimize: Option<bool>,
    pub prune_unused: Option<bool>,
    pub zip_imports: Option<bool>,
    pub strip_sources: Option<bool>,
    pub freeze_metadata: Option<bool>,
    pub block_packaging: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PyProject {
    #[serde(default)]
    tool: Tool,
}

#[derive(Debug, Default, Deserialize)]
struct Tool {
    shrinkwrap: Option<ProjectConfig>,
}

/// Reads `[tool.shrinkwrap]` from `<project_root>/pyproject.toml`.
///
/// A missing file or table yields the default (empty) config; a malformed
/// file is an error.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join("pyproject.toml");
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No pyproject.toml in {}", project_root.display());
            return Ok(ProjectConfig::default());
        }
        Err(e) => {
            return Err(BundlerError::Cli(CliError::ExecutionFailed {
                command: "read_pyproject".to_string(),
                reason: format!("Failed to read {}: {}", path.display(), e),
            }));
        }
    };

    let pyproject: PyProject = toml::from_str(&text)?;
    let config = pyproject.tool.shrinkwrap.unwrap_or_default();
    log::debug!("Loaded [tool.shrinkwrap] from {}: {:?}", path.display(), config);
    Ok(config)
}

/// Requirement specifiers from `requirements.txt` (and
/// `requirements-dev.txt` when `include_dev`), de-duplicated in order.
///
/// Blank lines, comments and `-` directives are skipped. Missing files are
/// reported as warnings.
pub fn discover_requirements(project_root: &Path, include_dev: bool) -> Result<Vec<String>> {
    let mut files = vec![REQUIREMENTS_FILE];
    if include_dev {
        files.push(DEV_REQUIREMENTS_FILE);
    }

    let mut seen = HashSet::new();
    let mut requirements = Vec::new();
    for name in files {
        let path = project_root.join(name);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("{name} not found; bundling without its dependencies");
                continue;
            }
            Err(e) => {
                return Err(BundlerError::Cli(CliError::ExecutionFailed {
                    command: "read_requirements".to_string(),
                    reason: format!("Failed to read {}: {}", path.display(), e),
                }));
            }
        };
        for requirement in parse_requirements(&text) {
            if seen.insert(requirement.clone()) {
                requirements.push(requirement);
            }
        }
    }
    Ok(requirements)
}

fn parse_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split(" #").next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .map(str::to_string)
        .collect()
}
