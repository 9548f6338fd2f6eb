//! Main build orchestration.
//!
//! [`Bundler`] drives one build through every pipeline stage, tagging failures
//! with the stage that produced them. The bundle is assembled in a staging
//! directory next to the output and only renamed into place once packaging
//! succeeded; on failure or cancellation the staging directory is removed.
//!
//! Cancellation is cooperative: the running stage is told to stop through a
//! [`CancellationToken`] and awaited before staging is cleaned up, so no
//! blocking task can write into the staging tree after it is gone.

use super::{
    checksum::calculate_sha256,
    lock::{OutputLock, lock_path},
};
use crate::bundler::{
    analyze::{ImportGraph, PrunePlan, PruneReport, SearchRoots, prune},
    deps::{DistributionIndex, Installer, PipInstaller},
    error::{Error, ErrorExt, Result},
    freeze::{FreezeReport, freeze},
    launcher,
    layout::BundleLayout,
    optimize::{self, BytecodeCompiler, OptimizeStats, PythonCompiler},
    platform::{self, BundleArtifact},
    runtime::{self, RuntimeDescriptor},
    settings::{BuildContext, OutputFormat},
    stage::{self, StageStats},
    utils::fs::{dir_size, remove_path},
};
use crate::error::{BundlerError, Stage, StageExt};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a finished build reports.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// The promoted artifact.
    pub artifact: BundleArtifact,
    /// Bundled interpreter version.
    pub python: String,
    /// Files copied into the staging tree.
    pub staged: StageStats,
    /// Modules in the import graph.
    pub modules: usize,
    /// Imported names that resolved nowhere, sorted.
    pub unresolved: Vec<String>,
    /// Distributions removed and retained by the pruner.
    pub prune: PruneReport,
    /// Optimizer counters.
    pub optimize: OptimizeStats,
    /// Distributions captured in the metadata snapshot.
    pub frozen: usize,
}

/// Main build orchestrator.
///
/// The runtime, compiler and installer default to the host interpreter, a
/// [`PythonCompiler`] and a [`PipInstaller`]; each can be replaced.
///
/// # Examples
///
/// ```no_run
/// use shrinkwrap::bundler::{BuildContextBuilder, Bundler, OutputFormat};
///
/// # async fn example() -> shrinkwrap::Result<()> {
/// let ctx = BuildContextBuilder::new()
///     .entry("app.main:app")
///     .format(OutputFormat::SingleFile)
///     .build()?;
/// let report = Bundler::new(ctx).bundle().await?;
/// println!("{} ({} bytes)", report.artifact.path.display(), report.artifact.size);
/// # Ok(())
/// # }
/// ```
pub struct Bundler {
    ctx: BuildContext,
    runtime: Option<RuntimeDescriptor>,
    compiler: Option<Arc<dyn BytecodeCompiler>>,
    installer: Arc<dyn Installer>,
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler")
            .field("ctx", &self.ctx)
            .field("runtime", &self.runtime)
            .field(
                "compiler",
                &self.compiler.as_ref().map(|_| "<BytecodeCompiler>"),
            )
            .finish()
    }
}

impl Bundler {
    /// Creates a bundler for `ctx` with the default collaborators.
    pub fn new(ctx: BuildContext) -> Self {
        Self {
            ctx,
            runtime: None,
            compiler: None,
            installer: Arc::new(PipInstaller::new()),
        }
    }

    /// Uses `runtime` instead of locating an interpreter.
    pub fn with_runtime(mut self, runtime: RuntimeDescriptor) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Uses `compiler` for bytecode compilation.
    pub fn with_compiler(mut self, compiler: Arc<dyn BytecodeCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Uses `installer` to resolve requirements.
    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    /// The build configuration.
    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Runs the build; Ctrl-C cancels it.
    pub async fn bundle(&self) -> crate::Result<BuildReport> {
        self.bundle_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::debug!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs the build, cancelling it when `cancel` completes first.
    pub async fn bundle_until<F>(&self, cancel: F) -> crate::Result<BuildReport>
    where
        F: Future<Output = ()>,
    {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => runtime::locate(self.ctx.python())
                .await
                .stage(Stage::Runtime)?,
        };

        let format = self.ctx.format();
        let target = platform::artifact_path(format, self.ctx.output(), runtime.is_windows());
        platform::preflight(format, self.ctx.stub()).stage(Stage::Configure)?;
        check_target(&target, self.ctx.force()).stage(Stage::Configure)?;

        let _lock = OutputLock::acquire(&target).stage(Stage::Configure)?;
        let staging = create_staging(&target).stage(Stage::Configure)?;
        log::debug!("Staging in {}", staging.path().display());

        let token = CancellationToken::new();
        let result = {
            let run = self.run(&runtime, &target, staging.path(), &token);
            tokio::pin!(run);

            tokio::select! {
                result = &mut run => result,
                _ = cancel => {
                    log::warn!("Build cancelled; waiting for the running stage to stop");
                    token.cancel();
                    match run.await {
                        Ok(report) => {
                            log::warn!("Cancellation arrived after the artifact was promoted");
                            Ok(report)
                        }
                        Err(e) => {
                            log::debug!("Build stopped: {e}");
                            Err(BundlerError::Bundler(Error::Cancelled))
                        }
                    }
                }
            }
        };

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            log::warn!("Could not remove {}: {e}", staging_path.display());
        }
        result
    }

    async fn run(
        &self,
        runtime: &RuntimeDescriptor,
        target: &Path,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> crate::Result<BuildReport> {
        let ctx = &self.ctx;
        let toggles = ctx.toggles();
        let layout = BundleLayout::for_runtime(staging.join("bundle"), runtime);

        let site_packages = self
            .resolve_dependencies(runtime, staging, cancel)
            .await
            .stage(Stage::Install)?;
        checkpoint(cancel)?;

        let mut excluded = vec![
            ctx.output().to_path_buf(),
            target.to_path_buf(),
            lock_path(target),
            staging.to_path_buf(),
        ];
        if site_packages.starts_with(ctx.project_root()) {
            excluded.push(site_packages.clone());
        }
        let staged = stage::stage(
            ctx.project_root(),
            runtime,
            &site_packages,
            &layout,
            &excluded,
        )
        .await
        .stage(Stage::Stage)?;
        checkpoint(cancel)?;

        let (index, graph, forced) = self
            .build_graph(runtime, &layout)
            .await
            .stage(Stage::Graph)?;
        checkpoint(cancel)?;
        let unresolved: Vec<String> = graph.unresolved().into_iter().map(str::to_string).collect();
        for name in &unresolved {
            log::warn!("Import `{name}` did not resolve; it may be optional or dynamic");
        }

        let reachable = graph.dependency_top_levels();
        let plan: PrunePlan = prune::plan(
            &index,
            &reachable,
            &forced,
            ctx.drop_set(),
            toggles.prune_unused,
        )
        .stage(Stage::Prune)?;
        let pruned = tokio::task::spawn_blocking(move || prune::apply(&index, &plan))
            .await
            .map_err(Error::from)
            .and_then(|r| r)
            .stage(Stage::Prune)?;
        log::info!(
            "Pruned {} distribution(s), retained {}",
            pruned.removed.len(),
            pruned.retained.len()
        );
        checkpoint(cancel)?;

        let compiler: Arc<dyn BytecodeCompiler> = match &self.compiler {
            Some(compiler) => Arc::clone(compiler),
            None => Arc::new(PythonCompiler::new(runtime.executable.clone())),
        };
        let optimized = optimize::optimize(&layout, toggles, compiler)
            .await
            .stage(Stage::Optimize)?;
        checkpoint(cancel)?;

        let frozen = if toggles.freeze_metadata {
            let snapshot_layout = layout.clone();
            let report: FreezeReport =
                tokio::task::spawn_blocking(move || freeze(&snapshot_layout))
                    .await
                    .map_err(Error::from)
                    .and_then(|r| r)
                    .stage(Stage::Freeze)?;
            report.distributions
        } else {
            0
        };
        checkpoint(cancel)?;

        if toggles.zip_imports {
            let pyz_layout = layout.clone();
            tokio::task::spawn_blocking(move || optimize::write_pyz(&pyz_layout))
                .await
                .map_err(Error::from)
                .and_then(|r| r)
                .stage(Stage::Optimize)?;
            checkpoint(cancel)?;
        }

        launcher::generate(&layout, ctx, runtime).stage(Stage::Launcher)?;

        let scratch = staging.join("artifact");
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        platform::package(ctx.format(), layout.root(), &scratch, &name, ctx.stub())
            .await
            .stage(Stage::Package)?;
        checkpoint(cancel)?;

        promote(&scratch, target, ctx.force())
            .await
            .stage(Stage::Promote)?;
        let artifact = describe(ctx.format(), target).await.stage(Stage::Promote)?;
        log::info!("Bundle written to {}", artifact.path.display());

        Ok(BuildReport {
            artifact,
            python: runtime.version_string.clone(),
            staged,
            modules: graph.len(),
            unresolved,
            prune: pruned,
            optimize: optimized,
            frozen,
        })
    }

    /// The dependency directory to stage: the pre-resolved one, or a fresh
    /// install into the staging area.
    async fn resolve_dependencies(
        &self,
        runtime: &RuntimeDescriptor,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if let Some(dir) = self.ctx.site_packages() {
            log::info!("Using pre-resolved dependencies at {}", dir.display());
            return Ok(dir.to_path_buf());
        }
        let target = staging.join("install");
        let installer = Arc::clone(&self.installer);
        let python = runtime.executable.clone();
        let requirements = self.ctx.requirements().to_vec();
        let dest = target.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            installer.install(&python, &requirements, &dest, &cancel)
        })
        .await??;
        Ok(target)
    }

    /// Indexes the staged distributions and traces imports from the entry
    /// module plus every module of the force-kept distributions.
    ///
    /// Force-kept means the keep set plus everything it requires through
    /// `Requires-Dist`, minus the drop set. Server packages load protocol
    /// and event-loop backends by string name, so their declared requirements
    /// are kept and all of their submodules are traced. Returns the index,
    /// the graph and the force-kept keys.
    async fn build_graph(
        &self,
        runtime: &RuntimeDescriptor,
        layout: &BundleLayout,
    ) -> Result<(DistributionIndex, ImportGraph, BTreeSet<String>)> {
        let site = layout.site_packages();
        let search = search_roots(layout, &runtime.builtin_modules);
        let entry = self.ctx.entry().module().to_string();
        let keep = self.ctx.keep().clone();
        let drop = self.ctx.drop_set().clone();

        tokio::task::spawn_blocking(move || {
            let index = DistributionIndex::scan(&site)?;
            let mut forced = index.requirement_closure(&keep);
            forced.retain(|key| !drop.contains(key));
            for key in forced.difference(&keep) {
                log::debug!("Keeping {key}: required by a kept package");
            }
            let extra_roots: Vec<String> = forced
                .iter()
                .flat_map(|key| index.module_names(key))
                .collect();
            forced.extend(keep);

            let graph = ImportGraph::build(&entry, &extra_roots, &search)?;
            log::info!(
                "Import graph: {} module(s), {} distribution(s) installed",
                graph.len(),
                index.len()
            );
            Ok((index, graph, forced))
        })
        .await?
    }
}

/// Resolution order for the staged bundle: application, dependencies, then
/// the stdlib with its extension module directories.
fn search_roots(layout: &BundleLayout, builtins: &BTreeSet<String>) -> SearchRoots {
    let stdlib = layout.stdlib_dir();
    let mut stdlib_roots = vec![stdlib.clone(), stdlib.join("lib-dynload")];
    if layout.is_windows() {
        stdlib_roots.push(layout.dlls_dir());
    }
    SearchRoots {
        app: layout.app_dir(),
        site_packages: layout.site_packages(),
        stdlib: stdlib_roots,
        builtins: builtins.clone(),
    }
}

/// Stops the pipeline between stages once cancellation was requested.
fn checkpoint(cancel: &CancellationToken) -> crate::Result<()> {
    if cancel.is_cancelled() {
        return Err(BundlerError::Bundler(Error::Cancelled));
    }
    Ok(())
}

/// Fails when `target` exists and `force` is off.
fn check_target(target: &Path, force: bool) -> Result<()> {
    if !force && std::fs::symlink_metadata(target).is_ok() {
        return Err(Error::OutputExists(target.to_path_buf()));
    }
    Ok(())
}

/// Hidden temp directory beside `target`, so promotion is a rename.
fn create_staging(target: &Path) -> Result<tempfile::TempDir> {
    let parent = target.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    tempfile::Builder::new()
        .prefix(".shrinkwrap-")
        .tempdir_in(parent)
        .fs_context("creating staging directory in", parent)
}

/// Moves `scratch` to `target`, replacing an existing target only when
/// `force` is set. The old output is removed entirely, never merged.
pub async fn promote(scratch: &Path, target: &Path, force: bool) -> Result<()> {
    if tokio::fs::symlink_metadata(target).await.is_ok() {
        if !force {
            return Err(Error::OutputExists(target.to_path_buf()));
        }
        log::info!("Replacing existing {}", target.display());
        let old = target.to_path_buf();
        tokio::task::spawn_blocking(move || remove_path(&old)).await??;
    }
    tokio::fs::rename(scratch, target)
        .await
        .fs_context("moving artifact to", target)
}

async fn describe(format: OutputFormat, path: &Path) -> Result<BundleArtifact> {
    let size = if format == OutputFormat::Directory {
        let dir = path.to_path_buf();
        tokio::task::spawn_blocking(move || dir_size(&dir)).await?
    } else {
        tokio::fs::metadata(path)
            .await
            .fs_context("reading artifact metadata", path)?
            .len()
    };
    let checksum = calculate_sha256(path).await?;
    Ok(BundleArtifact {
        format,
        path: path.to_path_buf(),
        size,
        checksum,
    })
}
