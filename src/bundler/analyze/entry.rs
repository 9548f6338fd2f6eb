//! Static inspection of the entry reference.

use super::graph::{ImportGraph, ModuleOrigin, SearchRoots};
use super::imports::extract_imports;
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    settings::EntryPoint,
};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Constructors of well-known ASGI applications.
const ASGI_CONSTRUCTORS: &[&str] = &[
    "FastAPI",
    "Starlette",
    "Quart",
    "Litestar",
    "Sanic",
    "Router",
    "get_asgi_application",
    "ASGIApp",
];

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(?::[^=]+)?=\s*([^=].*)$")
        .expect("assignment pattern is valid")
});

static DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+def|def|class)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("definition pattern is valid")
});

/// How the attribute is bound at module top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// `app = <expr>`
    Assignment(String),
    /// `def app(...)` / `async def app(...)` / `class App`
    Definition,
    /// `from x import app` / `import x as app`
    Import(String),
}

/// Result of [`inspect_entry`].
#[derive(Debug, Clone)]
pub struct EntryReport {
    /// Source file of the entry module.
    pub module_path: PathBuf,
    /// How the attribute is bound.
    pub binding: Binding,
    /// 1-based line of the binding.
    pub line: usize,
    /// The binding looks like an ASGI application.
    pub looks_asgi: bool,
}

/// Checks that `entry` resolves to a module inside `project_root` that binds
/// the attribute at top level. Nothing is executed.
pub fn inspect_entry(project_root: &Path, entry: &EntryPoint) -> Result<EntryReport> {
    let search = SearchRoots {
        app: project_root.to_path_buf(),
        ..Default::default()
    };
    let graph = ImportGraph::build(entry.module(), &[], &search)?;
    let module_path = graph
        .module(entry.module())
        .filter(|m| m.origin == ModuleOrigin::App)
        .and_then(|m| m.path.clone())
        .filter(|p| p.extension().is_some_and(|e| e == "py"))
        .ok_or_else(|| Error::InvalidEntryPoint {
            entry: entry.to_string(),
            reason: "module has no Python source".into(),
        })?;

    let bytes = std::fs::read(&module_path).fs_context("reading module", &module_path)?;
    let source = String::from_utf8_lossy(&bytes);

    let (binding, line) = find_binding(&source, entry.attribute()).ok_or_else(|| {
        Error::InvalidEntryPoint {
            entry: entry.to_string(),
            reason: format!(
                "`{}` is not bound at the top level of {}",
                entry.attribute(),
                module_path.display()
            ),
        }
    })?;

    // Annotated assignments count: `app: Starlette = build()`.
    let text = match &binding {
        Binding::Assignment(_) => source.lines().nth(line - 1).unwrap_or_default(),
        Binding::Import(target) => target.as_str(),
        Binding::Definition => "",
    };
    let looks_asgi =
        binding == Binding::Definition || ASGI_CONSTRUCTORS.iter().any(|c| text.contains(c));

    Ok(EntryReport {
        module_path,
        binding,
        line,
        looks_asgi,
    })
}

/// Last top-level binding of `attribute` in `source`.
fn find_binding(source: &str, attribute: &str) -> Option<(Binding, usize)> {
    let mut found = None;

    for (idx, raw) in source.lines().enumerate() {
        if raw.starts_with(char::is_whitespace) {
            continue;
        }
        let line = raw.trim_end();
        if let Some(caps) = ASSIGNMENT_RE.captures(line) {
            if &caps[1] == attribute {
                found = Some((Binding::Assignment(caps[2].trim().to_string()), idx + 1));
            }
        } else if let Some(caps) = DEFINITION_RE.captures(line) {
            if &caps[1] == attribute {
                found = Some((Binding::Definition, idx + 1));
            }
        }
    }

    for record in extract_imports(source) {
        if record.line <= found.as_ref().map_or(0, |(_, l)| *l) {
            continue;
        }
        let imported = if record.names.is_empty() {
            aliased(source, record.line, attribute).then(|| record.module.clone())
        } else if record.names.iter().any(|n| n == attribute)
            || aliased(source, record.line, attribute)
        {
            Some(format!("{}.{}", record.module, attribute))
        } else {
            None
        };
        if let Some(target) = imported {
            found = Some((Binding::Import(target), record.line));
        }
    }
    found
}

/// `... as attribute` on `line`.
fn aliased(source: &str, line: usize, attribute: &str) -> bool {
    source
        .lines()
        .nth(line.saturating_sub(1))
        .is_some_and(|text| {
            let mut words = text.split(|c: char| c.is_whitespace() || c == ',' || c == ')');
            while let Some(word) = words.next() {
                if word == "as" {
                    return words.find(|w| !w.is_empty()) == Some(attribute);
                }
            }
            false
        })
}
