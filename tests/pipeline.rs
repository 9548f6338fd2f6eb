//! End-to-end builds against a fake interpreter tree and a pre-resolved
//! dependency directory. No Python is needed: the runtime descriptor is
//! supplied directly and bytecode comes from a stand-in compiler.

use shrinkwrap::bundler::deps::Installer;
use shrinkwrap::bundler::optimize::BytecodeCompiler;
use shrinkwrap::bundler::platform::executable::stub::EmbeddedPayload;
use shrinkwrap::bundler::runtime::RuntimePlatform;
use shrinkwrap::bundler::{
    BuildContextBuilder, BuildReport, BundleLayout, Bundler, OutputFormat, RuntimeDescriptor,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Writes a non-empty `.pyc` beside every source.
struct StandInCompiler;

impl BytecodeCompiler for StandInCompiler {
    fn compile(&self, _root: &Path, sources: &[PathBuf]) -> shrinkwrap::bundler::Result<()> {
        for source in sources {
            fs::write(source.with_extension("pyc"), b"\x0b\x0d\x0d\x0abytecode").unwrap();
        }
        Ok(())
    }
}

/// Rejects everything.
struct BrokenCompiler;

impl BytecodeCompiler for BrokenCompiler {
    fn compile(&self, _root: &Path, sources: &[PathBuf]) -> shrinkwrap::bundler::Result<()> {
        match sources.first() {
            Some(source) => Err(shrinkwrap::bundler::Error::CompileFailed {
                path: source.clone(),
                message: "invalid syntax".into(),
            }),
            None => Ok(()),
        }
    }
}

/// Keeps writing into the install target well past any cancellation,
/// like an installer that cannot be interrupted.
struct StubbornInstaller;

impl Installer for StubbornInstaller {
    fn install(
        &self,
        _python: &Path,
        _requirements: &[String],
        target: &Path,
        _cancel: &CancellationToken,
    ) -> shrinkwrap::bundler::Result<()> {
        for step in 0..6 {
            std::thread::sleep(Duration::from_millis(50));
            write(&target.join(format!("late_{step}/__init__.py")), "");
        }
        Ok(())
    }
}

struct Workspace {
    dir: TempDir,
    project: PathBuf,
    site: PathBuf,
    runtime: RuntimeDescriptor,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        let python_root = root.join("python");
        let stdlib = python_root.join("lib/python3.12");
        write(&python_root.join("bin/python3.12"), "#!/bin/sh\n");
        write(&stdlib.join("os.py"), "import sys\n");
        write(&stdlib.join("json/__init__.py"), "from json import decoder\n");
        write(&stdlib.join("json/decoder.py"), "import re\n");
        write(&stdlib.join("re.py"), "");
        write(&stdlib.join("site-packages/host_only/__init__.py"), "");

        let runtime = RuntimeDescriptor {
            executable: python_root.join("bin/python3.12"),
            version_string: "3.12.4".to_string(),
            version: semver::Version::new(3, 12, 4),
            platform: RuntimePlatform::Posix,
            root: python_root.clone(),
            stdlib,
            shared_library: None,
            stdlib_archive: None,
            dlls_dir: None,
            builtin_modules: ["builtins", "sys"].iter().map(|s| s.to_string()).collect(),
        };

        let project = root.join("project");
        write(&project.join("app/__init__.py"), "");
        write(
            &project.join("app/main.py"),
            "from fastapi import FastAPI\nimport json\n\napp = FastAPI()\n",
        );
        write(&project.join("requirements.txt"), "fastapi\nuvicorn\npytest\n");

        let site = root.join("resolved");
        install(&site, "fastapi", "0.110.0", "from starlette.applications import Starlette\n");
        install(&site, "starlette", "0.36.3", "");
        write(&site.join("starlette/applications.py"), "import json\n");
        record(&site, "starlette", "0.36.3", &["starlette/__init__.py", "starlette/applications.py"]);
        install(&site, "uvicorn", "0.29.0", "import asyncio\n");
        install(&site, "pytest", "8.1.1", "");
        install(&site, "pip", "24.0", "");

        Self {
            dir,
            project,
            site,
            runtime,
        }
    }

    fn out(&self, name: &str) -> PathBuf {
        self.dir.path().join("dist").join(name)
    }

    fn context(&self, format: OutputFormat, output: &Path) -> BuildContextBuilder {
        BuildContextBuilder::new()
            .project_root(&self.project)
            .entry("app.main:app")
            .format(format)
            .output(output)
            .site_packages(Some(self.site.clone()))
    }

    async fn build(&self, builder: BuildContextBuilder) -> shrinkwrap::Result<BuildReport> {
        self.build_with(builder, Arc::new(StandInCompiler)).await
    }

    async fn build_with(
        &self,
        builder: BuildContextBuilder,
        compiler: Arc<dyn BytecodeCompiler>,
    ) -> shrinkwrap::Result<BuildReport> {
        let ctx = builder.build()?;
        Bundler::new(ctx)
            .with_runtime(self.runtime.clone())
            .with_compiler(compiler)
            .bundle_until(std::future::pending())
            .await
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A single-package distribution with a `.dist-info` directory.
fn install(site: &Path, name: &str, version: &str, init: &str) {
    write(&site.join(name).join("__init__.py"), init);
    record(site, name, version, &[&format!("{name}/__init__.py")]);
}

fn record(site: &Path, name: &str, version: &str, files: &[&str]) {
    let info = site.join(format!("{name}-{version}.dist-info"));
    write(
        &info.join("METADATA"),
        &format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n"),
    );
    write(&info.join("top_level.txt"), &format!("{name}\n"));
    let mut lines: Vec<String> = files.iter().map(|f| format!("{f},,")).collect();
    for meta in ["METADATA", "top_level.txt", "RECORD"] {
        lines.push(format!("{name}-{version}.dist-info/{meta},,"));
    }
    write(&info.join("RECORD"), &(lines.join("\n") + "\n"));
}

fn leftover_staging(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with(".shrinkwrap-"))
                .collect()
        })
        .unwrap_or_default()
}

fn retained(report: &BuildReport) -> BTreeSet<&str> {
    report.prune.retained.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn directory_bundle_keeps_only_reachable_and_server_distributions() {
    let ws = Workspace::new();
    let out = ws.out("app");
    let report = ws.build(ws.context(OutputFormat::Directory, &out)).await.unwrap();

    assert_eq!(report.artifact.path, out);
    assert_eq!(report.artifact.checksum.len(), 64);
    assert_eq!(report.python, "3.12.4");
    assert!(report.unresolved.contains(&"asyncio".to_string()));
    assert_eq!(
        retained(&report),
        BTreeSet::from(["fastapi", "starlette", "uvicorn"])
    );

    let layout = BundleLayout::new(&out, false, "3.12");
    assert!(BundleLayout::is_bundle_root(&out));
    assert!(layout.launcher().is_file());
    assert!(layout.python_bin().is_file());
    assert!(layout.stdlib_dir().join("json/__init__.py").is_file());
    assert!(!layout.stdlib_dir().join("site-packages").exists());

    let site = layout.site_packages();
    for kept in ["fastapi", "starlette", "uvicorn"] {
        assert!(site.join(kept).join("__init__.pyc").is_file(), "{kept} lost");
        assert!(!site.join(kept).join("__init__.py").exists());
    }
    assert!(!site.join("pytest").exists());
    assert!(!site.join("pip").exists());
    assert!(!site.join("pytest-8.1.1.dist-info").exists());

    assert!(layout.app_dir().join("app/main.pyc").is_file());
    assert!(!layout.app_dir().join("app/main.py").exists());
    assert!(layout.pyz().is_file());

    // Metadata is frozen into a snapshot.
    let snapshot: serde_json::Value =
        serde_json::from_slice(&fs::read(layout.metadata_snapshot()).unwrap()).unwrap();
    assert_eq!(snapshot["fastapi"]["version"], "0.110.0");
    assert!(snapshot.get("pytest").is_none());
    assert!(!site.join("fastapi-0.110.0.dist-info").exists());
    assert_eq!(report.frozen, 3);

    assert!(leftover_staging(out.parent().unwrap()).is_empty());
    // The pre-resolved directory is read, never modified.
    assert!(ws.site.join("pytest/__init__.py").is_file());
}

#[tokio::test]
async fn overrides_beat_reachability() {
    let ws = Workspace::new();
    let out = ws.out("app");
    let builder = ws
        .context(OutputFormat::Directory, &out)
        .keep_packages(["PyTest"])
        .drop_packages(["fastapi"]);
    let report = ws.build(builder).await.unwrap();

    let kept = retained(&report);
    assert!(kept.contains("pytest"));
    assert!(kept.contains("uvicorn"));
    assert!(!kept.contains("fastapi"));

    let site = BundleLayout::new(&out, false, "3.12").site_packages();
    assert!(site.join("pytest").is_dir());
    assert!(!site.join("fastapi").exists());
}

#[tokio::test]
async fn conflicting_overrides_fail_before_anything_is_written() {
    let ws = Workspace::new();
    let out = ws.out("app");
    let err = ws
        .build(
            ws.context(OutputFormat::Directory, &out)
                .keep_packages(["fastapi"])
                .drop_packages(["FastAPI"]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(!out.exists());
    assert!(!ws.dir.path().join("dist").exists());
}

#[tokio::test]
async fn existing_output_needs_force_and_is_replaced_whole() {
    let ws = Workspace::new();
    let out = ws.out("app");
    ws.build(ws.context(OutputFormat::Directory, &out)).await.unwrap();
    fs::write(out.join("stale.txt"), "left over").unwrap();

    let err = ws.build(ws.context(OutputFormat::Directory, &out)).await.unwrap_err();
    assert_eq!(err.exit_code(), 12);
    assert!(out.join("stale.txt").is_file());

    ws.build(ws.context(OutputFormat::Directory, &out).force(true))
        .await
        .unwrap();
    assert!(!out.join("stale.txt").exists());
    assert!(BundleLayout::is_bundle_root(&out));
}

#[tokio::test]
async fn toggles_off_leave_the_tree_untouched() {
    let ws = Workspace::new();
    let out = ws.out("plain");
    let toggles = shrinkwrap::bundler::Toggles {
        optimize: false,
        prune_unused: false,
        zip_imports: false,
        strip_sources: false,
        freeze_metadata: false,
        block_packaging: false,
    };
    let report = ws
        .build(ws.context(OutputFormat::Directory, &out).toggles(toggles))
        .await
        .unwrap();

    assert_eq!(report.optimize.modules_compiled, 0);
    assert_eq!(report.frozen, 0);
    let layout = BundleLayout::new(&out, false, "3.12");
    let site = layout.site_packages();
    assert!(site.join("pytest/__init__.py").is_file());
    assert!(site.join("pytest-8.1.1.dist-info/METADATA").is_file());
    assert!(layout.app_dir().join("app/main.py").is_file());
    assert!(!layout.pyz().exists());
    assert!(!layout.metadata_snapshot().exists());
}

#[tokio::test]
async fn singlefile_bundle_is_a_tarball_named_after_the_output() {
    let ws = Workspace::new();
    let out = ws.out("app");
    let report = ws.build(ws.context(OutputFormat::SingleFile, &out)).await.unwrap();

    let artifact = ws.out("app.tar.gz");
    assert_eq!(report.artifact.path, artifact);
    assert_eq!(report.artifact.size, fs::metadata(&artifact).unwrap().len());

    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(
        fs::File::open(&artifact).unwrap(),
    ));
    let names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n == "app/run"));
    assert!(names.iter().all(|n| n.starts_with("app")));
    assert!(leftover_staging(artifact.parent().unwrap()).is_empty());
}

#[tokio::test]
async fn executable_bundle_extracts_once_per_digest() {
    let ws = Workspace::new();
    let stub = ws.dir.path().join("stub");
    fs::write(&stub, b"\x7fELF not really a binary").unwrap();
    let out = ws.out("app");
    let report = ws
        .build(ws.context(OutputFormat::Executable, &out).stub(Some(stub.clone())))
        .await
        .unwrap();
    assert_eq!(report.artifact.path, out);

    let bytes = fs::read(&out).unwrap();
    assert!(bytes.starts_with(&fs::read(&stub).unwrap()));

    let payload = EmbeddedPayload::open(&out).unwrap().expect("payload");
    payload.verify().unwrap();
    let cache = TempDir::new().unwrap();
    let first = payload.extract(cache.path()).unwrap();
    assert!(BundleLayout::is_bundle_root(&first));
    assert!(first.join("run").is_file());

    let second = payload.extract(cache.path()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, cache.path().join(payload.digest_hex()));
}

#[tokio::test]
async fn compile_failure_leaves_no_artifact() {
    let ws = Workspace::new();
    let out = ws.out("app");
    let err = ws
        .build_with(ws.context(OutputFormat::Directory, &out), Arc::new(BrokenCompiler))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 20);
    assert!(err.to_string().starts_with("[optimize]"));
    assert!(!out.exists());
    assert!(leftover_staging(out.parent().unwrap()).is_empty());
}

#[tokio::test]
async fn cancellation_reports_130_and_promotes_nothing() {
    let ws = Workspace::new();
    let out = ws.out("app");
    let ctx = ws.context(OutputFormat::Directory, &out).build().unwrap();
    let err = Bundler::new(ctx)
        .with_runtime(ws.runtime.clone())
        .with_compiler(Arc::new(StandInCompiler))
        .bundle_until(std::future::ready(()))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 130);
    assert!(!out.exists());
}

#[tokio::test]
async fn cancellation_waits_for_the_running_stage_before_cleanup() {
    let ws = Workspace::new();
    let out = ws.out("app");
    let ctx = ws
        .context(OutputFormat::Directory, &out)
        .site_packages(None)
        .requirements(vec!["fastapi".into()])
        .build()
        .unwrap();
    let err = Bundler::new(ctx)
        .with_runtime(ws.runtime.clone())
        .with_compiler(Arc::new(StandInCompiler))
        .with_installer(Arc::new(StubbornInstaller))
        .bundle_until(tokio::time::sleep(Duration::from_millis(60)))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 130);
    let dist = out.parent().unwrap();
    assert!(leftover_staging(dist).is_empty());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(leftover_staging(dist).is_empty());
    assert!(!out.exists());
}

#[tokio::test]
async fn imports_of_enclosing_packages_are_retained() {
    let ws = Workspace::new();
    install(&ws.site, "sqlalchemy", "2.0.29", "");
    write(&ws.project.join("app/__init__.py"), "import sqlalchemy\n");
    let out = ws.out("app");
    let report = ws.build(ws.context(OutputFormat::Directory, &out)).await.unwrap();

    assert!(retained(&report).contains("sqlalchemy"));
    let site = BundleLayout::new(&out, false, "3.12").site_packages();
    assert!(site.join("sqlalchemy/__init__.pyc").is_file());
}

#[tokio::test]
async fn server_backends_and_requirements_are_retained() {
    let ws = Workspace::new();
    write(&ws.site.join("uvicorn/protocols/__init__.py"), "");
    write(&ws.site.join("uvicorn/protocols/websockets/__init__.py"), "");
    write(
        &ws.site.join("uvicorn/protocols/websockets/auto.py"),
        "import websockets\n",
    );
    record(
        &ws.site,
        "uvicorn",
        "0.29.0",
        &[
            "uvicorn/__init__.py",
            "uvicorn/protocols/__init__.py",
            "uvicorn/protocols/websockets/__init__.py",
            "uvicorn/protocols/websockets/auto.py",
        ],
    );
    write(
        &ws.site.join("uvicorn-0.29.0.dist-info/METADATA"),
        "Metadata-Version: 2.1\nName: uvicorn\nVersion: 0.29.0\nRequires-Dist: h11>=0.8\nRequires-Dist: httptools>=0.5.0; extra == \"standard\"\n",
    );
    install(&ws.site, "websockets", "12.0", "");
    install(&ws.site, "httptools", "0.6.1", "");
    install(&ws.site, "h11", "0.14.0", "");

    let out = ws.out("app");
    let report = ws.build(ws.context(OutputFormat::Directory, &out)).await.unwrap();

    let kept = retained(&report);
    for name in ["uvicorn", "websockets", "httptools", "h11"] {
        assert!(kept.contains(name), "{name} pruned");
    }
    assert!(!kept.contains("pytest"));

    let drop_backend = ws.context(OutputFormat::Directory, &ws.out("slim")).drop_packages(["httptools"]);
    let report = ws.build(drop_backend).await.unwrap();
    assert!(!retained(&report).contains("httptools"));
}
