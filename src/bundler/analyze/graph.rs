//! Import Graph Builder.
//!
//! Breadth-first traversal from the root modules over statically extracted
//! imports. Nodes are fully qualified module names; an edge `A -> B` means A
//! textually imports B. Application and dependency sources are traversed;
//! stdlib, builtin and native extension modules are leaves. Names that do not
//! resolve to a file are kept as `Unresolved` nodes instead of failing.

use super::imports::{ImportRecord, extract_imports};
use crate::bundler::error::{Error, ErrorExt, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Where a module name resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleOrigin {
    /// Application tree.
    App,
    /// Dependency tree (`site-packages`).
    Dependency,
    /// Interpreter standard library.
    Stdlib,
    /// Compiled into the interpreter.
    Builtin,
    /// No file found.
    Unresolved,
}

/// One module in the graph.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// Fully qualified name.
    pub name: String,
    /// Resolution result.
    pub origin: ModuleOrigin,
    /// Source, extension file or namespace directory.
    pub path: Option<PathBuf>,
}

impl ModuleNode {
    /// First dotted component.
    pub fn top_level(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    fn is_package(&self) -> bool {
        self.path.as_ref().is_some_and(|p| {
            p.file_name().is_some_and(|n| n == "__init__.py") || p.is_dir()
        })
    }

    fn traversable(&self) -> bool {
        matches!(self.origin, ModuleOrigin::App | ModuleOrigin::Dependency)
            && self
                .path
                .as_ref()
                .is_some_and(|p| p.extension().is_some_and(|e| e == "py"))
    }
}

/// Directories module names are resolved against, in priority order.
#[derive(Debug, Clone, Default)]
pub struct SearchRoots {
    /// Application tree.
    pub app: PathBuf,
    /// Dependency tree.
    pub site_packages: PathBuf,
    /// Stdlib directories (`lib/pythonX.Y`, `lib-dynload`, `DLLs`).
    pub stdlib: Vec<PathBuf>,
    /// Builtin module names.
    pub builtins: BTreeSet<String>,
}

enum Found {
    Source(PathBuf),
    Leaf(PathBuf),
    Namespace(PathBuf),
}

impl SearchRoots {
    fn resolve(&self, name: &str) -> (ModuleOrigin, Option<PathBuf>) {
        if self.builtins.contains(name) {
            return (ModuleOrigin::Builtin, None);
        }

        let mut namespace = None;
        let roots = [
            (ModuleOrigin::App, &self.app),
            (ModuleOrigin::Dependency, &self.site_packages),
        ]
        .into_iter()
        .chain(self.stdlib.iter().map(|r| (ModuleOrigin::Stdlib, r)));

        for (origin, root) in roots {
            match find_in(root, name) {
                Some(Found::Source(p)) | Some(Found::Leaf(p)) => return (origin, Some(p)),
                // A regular module later on the path wins over a namespace portion.
                Some(Found::Namespace(p)) if namespace.is_none() => namespace = Some((origin, p)),
                _ => {}
            }
        }
        match namespace {
            Some((origin, p)) => (origin, Some(p)),
            None => (ModuleOrigin::Unresolved, None),
        }
    }
}

fn find_in(root: &Path, name: &str) -> Option<Found> {
    let mut parts: Vec<&str> = name.split('.').collect();
    let last = parts.pop()?;
    let dir = parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p));

    let source = dir.join(format!("{last}.py"));
    if source.is_file() {
        return Some(Found::Source(source));
    }
    let package = dir.join(last);
    let init = package.join("__init__.py");
    if init.is_file() {
        return Some(Found::Source(init));
    }
    let compiled = package.join("__init__.pyc");
    if compiled.is_file() {
        return Some(Found::Leaf(compiled));
    }
    let compiled = dir.join(format!("{last}.pyc"));
    if compiled.is_file() {
        return Some(Found::Leaf(compiled));
    }
    if let Ok(entries) = std::fs::read_dir(&dir) {
        let prefix = format!("{last}.");
        for entry in entries.filter_map(|e| e.ok()) {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&prefix)
                && (file_name.ends_with(".so") || file_name.ends_with(".pyd"))
            {
                return Some(Found::Leaf(entry.path()));
            }
        }
    }
    if package.is_dir() {
        return Some(Found::Namespace(package));
    }
    None
}

/// Directed reachability graph over module names.
#[derive(Debug, Default)]
pub struct ImportGraph {
    graph: DiGraph<ModuleNode, ()>,
    index: HashMap<String, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl ImportGraph {
    /// Builds the graph from `entry` plus `extra_roots`.
    ///
    /// The entry module must resolve inside the application tree. Extra roots
    /// (force-kept packages) that do not resolve are recorded as unresolved.
    pub fn build(entry: &str, extra_roots: &[String], search: &SearchRoots) -> Result<Self> {
        let mut graph = Self::default();
        let mut queue = VecDeque::new();

        let (origin, path) = search.resolve(entry);
        if origin != ModuleOrigin::App {
            return Err(Error::InvalidEntryPoint {
                entry: entry.to_string(),
                reason: format!("module not found under {}", search.app.display()),
            });
        }
        let root = graph.insert_with_parents(entry, Some((origin, path)), search, &mut queue);
        graph.roots.push(root);

        for name in extra_roots {
            let node = graph.insert_with_parents(name, None, search, &mut queue);
            graph.roots.push(node);
        }

        while let Some(node) = queue.pop_front() {
            let module = graph.graph[node].clone();
            let Some(path) = module.path.as_deref() else {
                continue;
            };
            let bytes = std::fs::read(path).fs_context("reading module", path)?;
            let source = String::from_utf8_lossy(&bytes);

            for record in extract_imports(&source) {
                for target in targets(&module, &record, search) {
                    let target_node = match graph.index.get(&target) {
                        Some(&existing) => existing,
                        None => {
                            let (origin, path) = search.resolve(&target);
                            graph.insert(&target, origin, path, &mut queue)
                        }
                    };
                    graph.graph.update_edge(node, target_node, ());
                }
            }
        }

        log::debug!(
            "Import graph: {} modules, {} edges, {} unresolved",
            graph.graph.node_count(),
            graph.graph.edge_count(),
            graph.unresolved().len()
        );
        Ok(graph)
    }

    /// Adds `name` and each enclosing package, with an edge from every module
    /// to its parent: importing `a.b.c` executes `a/__init__.py` and
    /// `a/b/__init__.py` first. `resolved` is the already known resolution of
    /// `name` itself.
    fn insert_with_parents(
        &mut self,
        name: &str,
        mut resolved: Option<(ModuleOrigin, Option<PathBuf>)>,
        search: &SearchRoots,
        queue: &mut VecDeque<NodeIndex>,
    ) -> NodeIndex {
        let mut parent: Option<NodeIndex> = None;
        let mut end = 0;
        loop {
            end = name[end..].find('.').map_or(name.len(), |i| end + i);
            let prefix = &name[..end];
            let node = match self.index.get(prefix) {
                Some(&existing) => existing,
                None => {
                    let known = if end == name.len() { resolved.take() } else { None };
                    let (origin, path) = known.unwrap_or_else(|| search.resolve(prefix));
                    self.insert(prefix, origin, path, queue)
                }
            };
            if let Some(parent) = parent {
                self.graph.update_edge(node, parent, ());
            }
            if end == name.len() {
                return node;
            }
            parent = Some(node);
            end += 1;
        }
    }

    /// Adds a node; traversable modules are queued exactly once.
    fn insert(
        &mut self,
        name: &str,
        origin: ModuleOrigin,
        path: Option<PathBuf>,
        queue: &mut VecDeque<NodeIndex>,
    ) -> NodeIndex {
        if let Some(&existing) = self.index.get(name) {
            return existing;
        }
        let node = ModuleNode {
            name: name.to_string(),
            origin,
            path,
        };
        let traversable = node.traversable();
        let idx = self.graph.add_node(node);
        self.index.insert(name.to_string(), idx);
        if traversable {
            queue.push_back(idx);
        }
        idx
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// True when the graph has no modules.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// True if `name` is in the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Node for `name`.
    pub fn module(&self, name: &str) -> Option<&ModuleNode> {
        self.index.get(name).map(|&i| &self.graph[i])
    }

    /// Every module in the graph.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.graph.node_weights()
    }

    /// Root module names.
    pub fn roots(&self) -> Vec<&str> {
        self.roots.iter().map(|&i| self.graph[i].name.as_str()).collect()
    }

    /// Direct imports of `name`, sorted.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<&str> = self
            .graph
            .neighbors(idx)
            .map(|n| self.graph[n].name.as_str())
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Modules reachable from `name`, including itself.
    pub fn reachable_from(&self, name: &str) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        if let Some(&start) = self.index.get(name) {
            let mut bfs = Bfs::new(&self.graph, start);
            while let Some(n) = bfs.next(&self.graph) {
                out.insert(self.graph[n].name.as_str());
            }
        }
        out
    }

    /// Names that did not resolve to any file.
    pub fn unresolved(&self) -> BTreeSet<&str> {
        self.modules()
            .filter(|m| m.origin == ModuleOrigin::Unresolved)
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Top-level names of reachable modules that may belong to a
    /// distribution: resolved dependency modules plus unresolved names.
    pub fn dependency_top_levels(&self) -> BTreeSet<&str> {
        self.modules()
            .filter(|m| matches!(m.origin, ModuleOrigin::Dependency | ModuleOrigin::Unresolved))
            .map(ModuleNode::top_level)
            .collect()
    }
}

/// Absolute module names one import record reaches from `module`.
fn targets(module: &ModuleNode, record: &ImportRecord, search: &SearchRoots) -> Vec<String> {
    let base = if record.level == 0 {
        record.module.clone()
    } else {
        let mut package: Vec<&str> = module.name.split('.').collect();
        if !module.is_package() {
            package.pop();
        }
        for _ in 1..record.level {
            if package.pop().is_none() {
                break;
            }
        }
        if package.is_empty() {
            log::debug!(
                "{}:{} relative import beyond top-level package",
                module.name,
                record.line
            );
            return Vec::new();
        }
        let mut base = package.join(".");
        if !record.module.is_empty() {
            base.push('.');
            base.push_str(&record.module);
        }
        base
    };

    let mut out = Vec::new();
    let mut prefix = String::new();
    for part in base.split('.') {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(part);
        out.push(prefix.clone());
    }

    // `from pkg import name` reaches `pkg.name` only when it is a submodule.
    for name in &record.names {
        let candidate = format!("{base}.{name}");
        if search.resolve(&candidate).0 != ModuleOrigin::Unresolved {
            out.push(candidate);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn roots(dir: &Path) -> SearchRoots {
        SearchRoots {
            app: dir.join("app"),
            site_packages: dir.join("site-packages"),
            stdlib: vec![dir.join("stdlib")],
            builtins: BTreeSet::from(["sys".to_string()]),
        }
    }

    #[test]
    fn traverses_app_and_dependencies_but_not_stdlib() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/app/__init__.py", "");
        write(root, "app/app/main.py", "import json, sys\nfrom fastapi import FastAPI\nfrom .routes import users\n");
        write(root, "app/app/routes/__init__.py", "from . import users\n");
        write(root, "app/app/routes/users.py", "from ..models import User\n");
        write(root, "app/app/models.py", "import pydantic\n");
        write(root, "site-packages/fastapi/__init__.py", "from starlette.applications import Starlette\n");
        write(root, "site-packages/starlette/__init__.py", "");
        write(root, "site-packages/starlette/applications.py", "import anyio\n");
        write(root, "site-packages/pytest/__init__.py", "");
        write(root, "stdlib/json/__init__.py", "import decoder_not_followed\n");

        let graph = ImportGraph::build("app.main", &[], &roots(root)).unwrap();

        assert_eq!(graph.module("json").unwrap().origin, ModuleOrigin::Stdlib);
        assert_eq!(graph.module("sys").unwrap().origin, ModuleOrigin::Builtin);
        assert!(graph.contains("app.routes.users"));
        assert!(graph.contains("app.models"));
        assert!(graph.contains("starlette.applications"));
        assert!(!graph.contains("decoder_not_followed"));
        assert!(!graph.contains("pytest"));
        assert!(!graph.contains("fastapi.FastAPI"));

        let unresolved = graph.unresolved();
        assert!(unresolved.contains("pydantic"));
        assert!(unresolved.contains("anyio"));

        let tops = graph.dependency_top_levels();
        assert!(tops.contains("fastapi") && tops.contains("starlette") && tops.contains("pydantic"));
        assert!(!tops.contains("json"));
    }

    #[test]
    fn import_cycles_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/a.py", "import b\n");
        write(root, "app/b.py", "import c\n");
        write(root, "app/c.py", "import a\n");

        let graph = ImportGraph::build("a", &[], &roots(root)).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dependencies_of("c"), ["a"]);
        assert_eq!(graph.reachable_from("b").len(), 3);
    }

    #[test]
    fn extra_roots_pull_in_server_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/main.py", "import fastapi\n");
        write(root, "site-packages/fastapi/__init__.py", "");
        write(root, "site-packages/uvicorn/__init__.py", "import click\nimport h11\n");
        write(root, "site-packages/click/__init__.py", "");
        write(root, "site-packages/h11/__init__.py", "");

        let graph = ImportGraph::build("main", &["uvicorn".to_string()], &roots(root)).unwrap();
        assert_eq!(graph.roots(), ["main", "uvicorn"]);
        assert!(graph.contains("click") && graph.contains("h11"));
    }

    #[test]
    fn enclosing_packages_of_the_entry_are_traced() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/app/__init__.py", "import sqlalchemy\n");
        write(root, "app/app/api/__init__.py", "from .deps import session\n");
        write(root, "app/app/api/deps.py", "import redis\n");
        write(root, "app/app/api/main.py", "import fastapi\n");
        write(root, "site-packages/fastapi/__init__.py", "");
        write(root, "site-packages/sqlalchemy/__init__.py", "");
        write(root, "site-packages/redis/__init__.py", "");

        let graph = ImportGraph::build("app.api.main", &[], &roots(root)).unwrap();

        assert_eq!(graph.roots(), ["app.api.main"]);
        assert_eq!(graph.dependencies_of("app.api.main"), ["app.api", "fastapi"]);
        let reachable = graph.reachable_from("app.api.main");
        assert!(reachable.contains("app") && reachable.contains("app.api.deps"));
        let tops = graph.dependency_top_levels();
        assert!(tops.contains("sqlalchemy") && tops.contains("redis"));
    }

    #[test]
    fn missing_entry_module_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImportGraph::build("nope.main", &[], &roots(dir.path())).unwrap_err();
        assert!(matches!(err, Error::InvalidEntryPoint { .. }));
    }
}
