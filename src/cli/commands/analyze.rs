//! `shrinkwrap analyze`

use super::entry_reference;
use crate::bundler::{analyze::inspect_entry, analyze::Binding, settings::EntryPoint};
use crate::cli::{AnalyzeArgs, OutputManager};
use crate::error::{Result, Stage, StageExt};
use crate::metadata::load_project_config;
use path_absolutize::Absolutize;

/// Statically checks the entry reference. Returns the process exit code.
pub async fn analyze(args: &AnalyzeArgs, output: &OutputManager) -> Result<i32> {
    let project = args.project.absolutize()?.into_owned();
    let config = load_project_config(&project)?;
    let reference = entry_reference(args.entry.as_deref(), &config)?;
    let entry: EntryPoint = reference.parse().stage(Stage::Configure)?;

    output.progress(&format!("Analyzing entry point {entry}"))?;
    let report = {
        let project = project.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || inspect_entry(&project, &entry))
            .await
            .map_err(crate::bundler::Error::from)
            .and_then(|r| r)
            .stage(Stage::Graph)?
    };

    let rel = report
        .module_path
        .strip_prefix(&project)
        .unwrap_or(&report.module_path);
    let binding = match &report.binding {
        Binding::Assignment(expr) => format!("assigned from `{expr}`"),
        Binding::Definition => "defined by def/class".to_string(),
        Binding::Import(target) => format!("imported from `{target}`"),
    };
    output.stat("module", &rel.display().to_string())?;
    output.stat("binding", &format!("`{}` {binding} (line {})", entry.attribute(), report.line))?;

    if report.looks_asgi {
        output.success(&format!("{entry} looks like an ASGI application"))?;
    } else {
        output.warn(&format!(
            "`{}` is bound but does not look like a known ASGI application constructor",
            entry.attribute()
        ))?;
    }
    Ok(0)
}
