//! `shrinkwrap build`

use super::entry_reference;
use crate::bundler::{BuildContextBuilder, BuildReport, Bundler, OutputFormat};
use crate::cli::output::{format_bytes, format_duration};
use crate::cli::{BuildArgs, OutputManager};
use crate::error::{CliError, Result, Stage, StageExt};
use crate::metadata::{discover_requirements, load_project_config};
use path_absolutize::Absolutize;
use std::time::Instant;

/// Runs the full pipeline. Returns the process exit code.
pub async fn build(args: &BuildArgs, output: &OutputManager) -> Result<i32> {
    let started = Instant::now();
    let project = args.project.absolutize()?.into_owned();
    let config = load_project_config(&project)?;
    let entry = entry_reference(args.entry.as_deref(), &config)?;

    // Command-line outputs are relative to the working directory, configured
    // ones to the project root.
    let output_path = match &args.output {
        Some(path) => Some(path.absolutize()?.into_owned()),
        None => config.output.clone(),
    };
    let server = if args.server.is_empty() {
        config.server_packages.clone()
    } else {
        Some(args.server.clone())
    };

    let format = args.format.or(config.format).unwrap_or_default();
    if args.stub.is_some() && format != OutputFormat::Executable {
        return Err(CliError::InvalidArguments {
            reason: format!("--stub only applies to the executable format, not {format}"),
        }
        .into());
    }

    let requirements = if args.site_packages.is_some() {
        Vec::new()
    } else {
        discover_requirements(&project, args.dev_requirements)?
    };

    let mut builder = BuildContextBuilder::new()
        .project_root(&project)
        .entry(entry)
        .format(format)
        .python(args.python.clone().or_else(|| config.python.clone()))
        .site_packages(args.site_packages.clone())
        .requirements(requirements)
        .keep_packages(config.keep_packages.iter().chain(&args.keep))
        .drop_packages(config.drop_packages.iter().chain(&args.drop))
        .toggles(args.toggles.resolve(&config))
        .stub(args.stub.clone())
        .force(args.force);
    if let Some(path) = output_path {
        builder = builder.output(path);
    }
    if let Some(server) = server {
        builder = builder.server_packages(server);
    }
    let ctx = builder.build().stage(Stage::Configure)?;

    output.section(&format!("Building {} bundle for {}", ctx.format(), ctx.entry()))?;
    output.verbose(&format!("Project root: {}", ctx.project_root().display()))?;
    output.verbose(&format!("Toggles: {:?}", ctx.toggles()))?;

    let report = Bundler::new(ctx).bundle().await?;
    print_report(output, &report)?;
    output.success(&format!(
        "Built {} in {}",
        report.artifact.path.display(),
        format_duration(started.elapsed())
    ))?;
    Ok(0)
}

fn print_report(output: &OutputManager, report: &BuildReport) -> std::io::Result<()> {
    output.stat("python", &report.python)?;
    output.stat(
        "staged",
        &format!(
            "{} app, {} dependency, {} runtime files",
            report.staged.app_files, report.staged.dependency_files, report.staged.runtime_files
        ),
    )?;
    output.stat("modules", &report.modules.to_string())?;
    output.stat(
        "retained",
        &format!("{} distribution(s)", report.prune.retained.len()),
    )?;
    if !report.prune.removed.is_empty() {
        output.stat(
            "pruned",
            &format!(
                "{} distribution(s), {} reclaimed",
                report.prune.removed.len(),
                format_bytes(report.prune.reclaimed_bytes())
            ),
        )?;
        for removed in &report.prune.removed {
            output.verbose(&format!(
                "    - {} {} ({})",
                removed.name,
                removed.version,
                format_bytes(removed.bytes)
            ))?;
        }
    }
    let opt = &report.optimize;
    output.stat(
        "optimized",
        &format!(
            "{} files and {} dirs removed ({}), {} compiled, {} sources stripped",
            opt.files_removed,
            opt.dirs_removed,
            format_bytes(opt.bytes_reclaimed),
            opt.modules_compiled,
            opt.sources_stripped
        ),
    )?;
    if report.frozen > 0 {
        output.stat("frozen metadata", &format!("{} distribution(s)", report.frozen))?;
    }
    if !report.unresolved.is_empty() {
        output.warn(&format!(
            "{} import(s) did not resolve: {}",
            report.unresolved.len(),
            report.unresolved.join(", ")
        ))?;
    }
    output.stat("artifact", &report.artifact.path.display().to_string())?;
    output.stat("size", &format_bytes(report.artifact.size))?;
    output.stat("sha256", &report.artifact.checksum)?;
    Ok(())
}
