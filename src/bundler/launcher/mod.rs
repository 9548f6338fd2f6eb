//! Launcher Generator.
//!
//! Writes the entry script (`run` or `run.bat`), the `sitecustomize.py` shim
//! that installs the packaging guard and frozen-metadata hooks, and the
//! bundle marker. The launcher points `PYTHONHOME` and `PYTHONPATH`
//! exclusively inside the bundle and starts the ASGI server with the entry
//! reference.

mod template;

use crate::bundler::{
    error::{ErrorExt, Result},
    layout::BundleLayout,
    runtime::RuntimeDescriptor,
    settings::BuildContext,
    utils::fs::{set_executable, write_atomic},
};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Bind address unless `HOST` is set.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Port unless `PORT` is set.
pub const DEFAULT_PORT: u16 = 8000;

/// Contents of the marker file at every bundle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMarker {
    /// Always `shrinkwrap`.
    pub tool: String,
    /// Version of the tool that built the bundle.
    pub tool_version: String,
    /// Random per-build identifier.
    pub build_id: String,
    /// RFC 3339 build time.
    pub created: String,
    /// `module:attribute`
    pub entry: String,
    /// Output format name.
    pub format: String,
    /// Bundled interpreter version.
    pub python: String,
}

impl BundleMarker {
    /// Marker for a build of `ctx` with `runtime`.
    pub fn new(ctx: &BuildContext, runtime: &RuntimeDescriptor) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            build_id: uuid::Uuid::new_v4().to_string(),
            created: chrono::Utc::now().to_rfc3339(),
            entry: ctx.entry().to_string(),
            format: ctx.format().name().to_string(),
            python: runtime.version_string.clone(),
        }
    }

    /// Reads the marker of the bundle rooted at `root`.
    pub fn read(root: &Path) -> Result<Self> {
        let path = root.join(crate::bundler::layout::MARKER_FILE);
        let bytes = std::fs::read(&path).fs_context("reading marker", &path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Files written by [`generate`].
#[derive(Debug, Clone)]
pub struct LauncherFiles {
    /// `run` or `run.bat`.
    pub launcher: PathBuf,
    /// `meta/sitecustomize.py`.
    pub sitecustomize: PathBuf,
    /// Bundle marker.
    pub marker: PathBuf,
}

/// Writes the launcher, the runtime shim and the marker into `layout`.
///
/// Must run after freezing and after `bundle.pyz` is written: whether the
/// snapshot or the stdlib archive are referenced depends on what is present.
pub fn generate(
    layout: &BundleLayout,
    ctx: &BuildContext,
    runtime: &RuntimeDescriptor,
) -> Result<LauncherFiles> {
    let toggles = ctx.toggles();
    let snapshot = layout.metadata_snapshot();

    let mut data: BTreeMap<&str, Value> = BTreeMap::new();
    data.insert("tool_version", json!(env!("CARGO_PKG_VERSION")));
    data.insert("entry", json!(ctx.entry().to_string()));
    data.insert("server", json!(ctx.server_module()));
    data.insert("default_host", json!(DEFAULT_HOST));
    data.insert("default_port", json!(DEFAULT_PORT));
    data.insert("zip_imports", json!(toggles.zip_imports && layout.pyz().is_file()));
    data.insert("block_packaging", json!(toggles.block_packaging));
    data.insert("freeze_metadata", json!(toggles.freeze_metadata && snapshot.is_file()));
    data.insert(
        "snapshot_name",
        json!(snapshot.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()),
    );
    let archive = layout.stdlib_archive();
    if archive.is_file() {
        if let Some(name) = archive.file_name() {
            data.insert("stdlib_archive", json!(name.to_string_lossy()));
        }
    }

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("sitecustomize", template::SITECUSTOMIZE)
        .map_err(Box::new)?;

    let launcher = if layout.is_windows() {
        handlebars
            .register_template_string("launcher", template::WINDOWS_LAUNCHER)
            .map_err(Box::new)?;
        let path = layout.launcher_bat();
        let script = handlebars.render("launcher", &data)?.replace('\n', "\r\n");
        write_atomic(&path, script.as_bytes())?;
        path
    } else {
        handlebars
            .register_template_string("launcher", template::POSIX_LAUNCHER)
            .map_err(Box::new)?;
        let path = layout.launcher();
        write_atomic(&path, handlebars.render("launcher", &data)?.as_bytes())?;
        set_executable(&path)?;
        path
    };

    let sitecustomize = layout.sitecustomize();
    write_atomic(&sitecustomize, handlebars.render("sitecustomize", &data)?.as_bytes())?;

    let marker = layout.marker();
    let info = BundleMarker::new(ctx, runtime);
    write_atomic(&marker, &serde_json::to_vec_pretty(&info)?)?;

    log::debug!("Launcher written to {}", launcher.display());
    Ok(LauncherFiles {
        launcher,
        sitecustomize,
        marker,
    })
}
