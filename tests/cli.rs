//! CLI smoke tests: argument handling, exit codes and the `analyze` report.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn shrinkwrap() -> Command {
    let mut cmd = cargo_bin_cmd!("shrinkwrap");
    cmd.env_remove("SHRINKWRAP_PYTHON").env("NO_COLOR", "1");
    cmd
}

/// A project with `app/main.py` defining a FastAPI app.
fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let app = temp.path().join("app");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(app.join("__init__.py"), "").unwrap();
    std::fs::write(
        app.join("main.py"),
        "from fastapi import FastAPI\n\napp = FastAPI(title=\"demo\")\n",
    )
    .unwrap();
    temp
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_lists_subcommands() {
    shrinkwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("build"));
}

#[test]
fn version_prints_package_version() {
    shrinkwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_format_is_a_usage_error() {
    shrinkwrap()
        .args(["build", "-e", "app.main:app", "-f", "rpm"])
        .assert()
        .code(2);
}

// =============================================================================
// analyze
// =============================================================================

#[test]
fn analyze_recognizes_an_asgi_app() {
    let temp = project();
    shrinkwrap()
        .args(["analyze", "-e", "app.main:app", "-p"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("looks like an ASGI application"))
        .stdout(predicate::str::contains("FastAPI"));
}

#[test]
fn analyze_reads_entry_from_pyproject() {
    let temp = project();
    std::fs::write(
        temp.path().join("pyproject.toml"),
        "[tool.shrinkwrap]\nentry = \"app.main:app\"\n",
    )
    .unwrap();
    shrinkwrap()
        .args(["analyze", "-p"])
        .arg(temp.path())
        .assert()
        .success();
}

#[test]
fn analyze_without_entry_fails_with_usage_code() {
    let temp = project();
    shrinkwrap()
        .args(["analyze", "-p"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--entry"));
}

#[test]
fn analyze_rejects_a_missing_attribute() {
    let temp = project();
    shrinkwrap()
        .args(["analyze", "-e", "app.main:api", "-p"])
        .arg(temp.path())
        .assert()
        .code(2);
}

#[test]
fn analyze_rejects_a_malformed_reference() {
    let temp = project();
    shrinkwrap()
        .args(["analyze", "-e", "app.main", "-p"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("[configure]"));
}

#[test]
fn unknown_pyproject_key_is_a_usage_error() {
    let temp = project();
    std::fs::write(
        temp.path().join("pyproject.toml"),
        "[tool.shrinkwrap]\nentrypoint = \"app.main:app\"\n",
    )
    .unwrap();
    shrinkwrap()
        .args(["analyze", "-p"])
        .arg(temp.path())
        .assert()
        .code(2);
}

// =============================================================================
// build
// =============================================================================

#[test]
fn build_rejects_conflicting_overrides() {
    let temp = project();
    shrinkwrap()
        .args(["build", "-e", "app.main:app", "-k", "Requests", "-d", "requests", "-p"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("requests"));
    assert!(!temp.path().join("dist").exists());
}

#[test]
fn build_reports_a_missing_interpreter() {
    let temp = project();
    shrinkwrap()
        .args(["build", "-e", "app.main:app", "--python"])
        .arg(temp.path().join("no-such-python"))
        .arg("-p")
        .arg(temp.path())
        .assert()
        .code(11)
        .stderr(predicate::str::contains("[runtime]"));
    assert!(!temp.path().join("dist/app").exists());
}

#[test]
fn stub_requires_the_executable_format() {
    let temp = project();
    shrinkwrap()
        .args(["build", "-e", "app.main:app", "--stub", "/bin/sh", "-p"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--stub"));
}

#[test]
fn failures_print_the_error_and_its_hints() {
    let temp = project();
    shrinkwrap()
        .args(["build", "-e", "app.main:app", "-f", "directory", "--stub", "/bin/sh", "-p"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--stub only applies to the executable format"))
        .stdout(predicate::str::contains("hint: Run `shrinkwrap --help` for usage"));
}
