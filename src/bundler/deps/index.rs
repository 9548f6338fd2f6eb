//! Index of the distributions installed in a `site-packages` directory.

use super::normalize_name;
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    settings::is_identifier,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// Version recorded for modules that no metadata directory claims.
pub const UNKNOWN_VERSION: &str = "0+unknown";

/// Extension suffixes that mark a native module.
const EXTENSION_SUFFIXES: &[&str] = &[".so", ".pyd"];

/// One `[group] name = value` line from `entry_points.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPointRecord {
    /// Entry point group, e.g. `console_scripts`.
    pub group: String,
    /// Entry point name.
    pub name: String,
    /// Object reference.
    pub value: String,
}

/// One installed dependency package.
#[derive(Debug, Clone)]
pub struct Distribution {
    name: String,
    version: String,
    top_level: BTreeSet<String>,
    files: Vec<PathBuf>,
    requires: Vec<String>,
    entry_points: Vec<EntryPointRecord>,
    metadata_dir: Option<PathBuf>,
}

impl Distribution {
    /// Display name as declared in the metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized name, the key distributions are compared by.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Declared version, or [`UNKNOWN_VERSION`].
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Top-level importable module names.
    pub fn top_level(&self) -> &BTreeSet<String> {
        &self.top_level
    }

    /// Installed files relative to `site-packages`, from `RECORD`.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// `Requires-Dist` specifiers.
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// Parsed `entry_points.txt`.
    pub fn entry_points(&self) -> &[EntryPointRecord] {
        &self.entry_points
    }

    /// The `*.dist-info` / `*.egg-info` directory, relative to `site-packages`.
    pub fn metadata_dir(&self) -> Option<&Path> {
        self.metadata_dir.as_deref()
    }

    /// True for distributions inferred from an unclaimed module.
    pub fn is_synthetic(&self) -> bool {
        self.metadata_dir.is_none()
    }
}

/// Distributions of one `site-packages` tree, keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct DistributionIndex {
    root: PathBuf,
    dists: BTreeMap<String, Distribution>,
    owners: BTreeMap<String, Vec<String>>,
    entries: BTreeMap<String, Vec<PathBuf>>,
    namespaces: BTreeSet<String>,
}

impl DistributionIndex {
    /// Scans `site_packages`. A missing directory yields an empty index.
    pub fn scan(site_packages: &Path) -> Result<Self> {
        let mut index = Self {
            root: site_packages.to_path_buf(),
            ..Default::default()
        };
        if !site_packages.exists() {
            return Ok(index);
        }

        let mut listing: Vec<_> = std::fs::read_dir(site_packages)
            .fs_context("reading", site_packages)?
            .collect::<std::io::Result<_>>()
            .fs_context("reading", site_packages)?;
        listing.sort_by_key(|e| e.file_name());

        for entry in listing {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = path.is_dir();

            if is_dir && file_name.ends_with(".dist-info") {
                let dist = read_dist_info(&path, &file_name)?;
                index.insert(dist);
            } else if is_dir && file_name.ends_with(".egg-info") {
                let dist = read_egg_info(&path, &file_name)?;
                index.insert(dist);
            } else if let Some((module, namespace)) = module_name(&path, &file_name, is_dir) {
                if namespace {
                    index.namespaces.insert(module.clone());
                } else {
                    index.namespaces.remove(&module);
                }
                index.entries.entry(module).or_default().push(path);
            }
        }

        // Namespace status only holds if every entry for the name is a plain dir.
        let regular: BTreeSet<String> = index
            .entries
            .iter()
            .filter(|(_, paths)| paths.iter().any(|p| !p.is_dir() || has_init(p)))
            .map(|(m, _)| m.clone())
            .collect();
        index.namespaces.retain(|m| !regular.contains(m));

        index.adopt_orphans();
        Ok(index)
    }

    fn insert(&mut self, mut dist: Distribution) {
        let key = dist.key();
        if let Some(existing) = self.dists.get_mut(&key) {
            log::warn!(
                "distribution `{}` is installed twice ({} and {}); merging",
                dist.name,
                existing.version,
                dist.version
            );
            existing.top_level.append(&mut dist.top_level);
            existing.files.append(&mut dist.files);
            return;
        }
        for module in &dist.top_level {
            self.owners.entry(module.clone()).or_default().push(key.clone());
        }
        self.dists.insert(key, dist);
    }

    /// Attaches unclaimed importable entries to a distribution of the same
    /// normalized name, or records them as synthetic distributions.
    fn adopt_orphans(&mut self) {
        let orphans: Vec<String> = self
            .entries
            .keys()
            .filter(|m| !self.owners.contains_key(*m) && !self.namespaces.contains(*m))
            .cloned()
            .collect();

        for module in orphans {
            let key = normalize_name(&module);
            if let Some(dist) = self.dists.get_mut(&key) {
                log::debug!("module `{module}` adopted by distribution `{}`", dist.name);
                dist.top_level.insert(module.clone());
            } else {
                log::debug!("module `{module}` has no metadata; treating it as its own distribution");
                self.dists.insert(
                    key.clone(),
                    Distribution {
                        name: module.clone(),
                        version: UNKNOWN_VERSION.to_string(),
                        top_level: BTreeSet::from([module.clone()]),
                        files: Vec::new(),
                        requires: Vec::new(),
                        entry_points: Vec::new(),
                        metadata_dir: None,
                    },
                );
            }
            self.owners.entry(module).or_default().push(key);
        }
    }

    /// The scanned directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of distributions.
    pub fn len(&self) -> usize {
        self.dists.len()
    }

    /// True when no distribution is installed.
    pub fn is_empty(&self) -> bool {
        self.dists.is_empty()
    }

    /// Looks up a distribution by (any spelling of) its name.
    pub fn get(&self, name: &str) -> Option<&Distribution> {
        self.dists.get(&normalize_name(name))
    }

    /// Iterates `(key, distribution)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Distribution)> {
        self.dists.iter()
    }

    /// Keys of every distribution.
    pub fn keys(&self) -> BTreeSet<String> {
        self.dists.keys().cloned().collect()
    }

    /// Keys of the distributions claiming `module` as a top-level name.
    pub fn owners_of(&self, module: &str) -> &[String] {
        self.owners.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Importable modules of the distribution `key`: its top-level names plus
    /// every installed submodule listed in `RECORD`. Test packages are left
    /// out.
    pub fn module_names(&self, key: &str) -> BTreeSet<String> {
        let Some(dist) = self.dists.get(key) else {
            return BTreeSet::new();
        };
        let mut names = dist.top_level.clone();
        names.extend(
            dist.files
                .iter()
                .filter(|f| self.root.join(f).is_file())
                .filter_map(|f| dotted_module(f)),
        );
        names
    }

    /// Keys of the installed distributions in `names` plus everything they
    /// require through `Requires-Dist`, transitively. Requirements that are
    /// not installed (unselected extras, platform markers) are skipped.
    pub fn requirement_closure<'a, I>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<String> = names.into_iter().map(|n| normalize_name(n)).collect();
        while let Some(key) = pending.pop() {
            let Some(dist) = self.dists.get(&key) else {
                continue;
            };
            if !closure.insert(key) {
                continue;
            }
            pending.extend(
                dist.requires
                    .iter()
                    .filter_map(|r| requirement_name(r))
                    .map(normalize_name)
                    .filter(|k| !closure.contains(k)),
            );
        }
        closure
    }

    /// True when `module` is an implicit namespace package split across distributions.
    pub fn is_namespace(&self, module: &str) -> bool {
        self.namespaces.contains(module)
    }

    /// On-disk entries (`pkg/`, `pkg.py`, `pkg.*.so`) providing `module`.
    pub fn entries_of(&self, module: &str) -> &[PathBuf] {
        self.entries.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rejects a retained set in which two distributions claim one regular
    /// top-level module.
    pub fn check_conflicts(&self, retained: &BTreeSet<String>) -> Result<()> {
        for (module, owners) in &self.owners {
            if self.is_namespace(module) {
                continue;
            }
            let mut claimed = owners.iter().filter(|k| retained.contains(*k));
            if let (Some(first), Some(second)) = (claimed.next(), claimed.next()) {
                return Err(Error::ModuleConflict {
                    module: module.clone(),
                    first: self.display_name(first),
                    second: self.display_name(second),
                });
            }
        }
        Ok(())
    }

    fn display_name(&self, key: &str) -> String {
        self.dists
            .get(key)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| key.to_string())
    }

    /// Absolute paths to delete when removing the distribution `key`.
    ///
    /// Top-level entries are included only when no other distribution claims
    /// the same module; shared namespace directories lose just their manifest
    /// files.
    pub fn removal_paths(&self, key: &str) -> Vec<PathBuf> {
        let Some(dist) = self.dists.get(key) else {
            return Vec::new();
        };

        let mut paths = BTreeSet::new();
        for module in &dist.top_level {
            if self.owners_of(module).iter().all(|k| k == key) {
                paths.extend(self.entries_of(module).iter().cloned());
            }
        }
        paths.extend(dist.files.iter().map(|f| self.root.join(f)));
        if let Some(meta) = &dist.metadata_dir {
            paths.insert(self.root.join(meta));
        }
        paths.into_iter().collect()
    }

    /// Current files of a distribution, relative to the index root: surviving
    /// manifest entries plus everything under its exclusively owned modules.
    /// The metadata directory is excluded.
    pub fn current_files(&self, key: &str) -> Vec<PathBuf> {
        let Some(dist) = self.dists.get(key) else {
            return Vec::new();
        };
        let meta = dist.metadata_dir.as_deref();

        let mut files: BTreeSet<PathBuf> = dist
            .files
            .iter()
            .filter(|f| meta.is_none_or(|m| !f.starts_with(m)))
            .filter(|f| self.root.join(f).is_file())
            .cloned()
            .collect();

        for module in &dist.top_level {
            if !self.owners_of(module).iter().all(|k| k == key) {
                continue;
            }
            for entry in self.entries_of(module) {
                for file in walkdir::WalkDir::new(entry)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    if let Ok(rel) = file.path().strip_prefix(&self.root) {
                        files.insert(rel.to_path_buf());
                    }
                }
            }
        }
        files.into_iter().collect()
    }
}

/// Maps a top-level `site-packages` entry to the module it provides and
/// whether it is a namespace-only directory.
fn module_name(path: &Path, file_name: &str, is_dir: bool) -> Option<(String, bool)> {
    if is_dir {
        if file_name == "__pycache__" || file_name == "bin" || !is_identifier(file_name) {
            return None;
        }
        let namespace = !has_init(path);
        if namespace && !contains_python(path) {
            return None;
        }
        return Some((file_name.to_string(), namespace));
    }

    if let Some(stem) = file_name
        .strip_suffix(".py")
        .or_else(|| file_name.strip_suffix(".pyc"))
    {
        return is_identifier(stem).then(|| (stem.to_string(), false));
    }
    if EXTENSION_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
        let stem = file_name.split('.').next().unwrap_or_default();
        return is_identifier(stem).then(|| (stem.to_string(), false));
    }
    None
}

/// Regular package marker, as source or as sourceless bytecode.
fn has_init(dir: &Path) -> bool {
    dir.join("__init__.py").exists() || dir.join("__init__.pyc").exists()
}

fn contains_python(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| {
            let name = e.file_name().to_string_lossy();
            e.file_type().is_file()
                && (name.ends_with(".py")
                    || name.ends_with(".pyc")
                    || EXTENSION_SUFFIXES.iter().any(|s| name.ends_with(s)))
        })
}

fn read_dist_info(dir: &Path, file_name: &str) -> Result<Distribution> {
    let headers = read_optional(&dir.join("METADATA"))?
        .map(|text| parse_headers(&text))
        .unwrap_or_default();

    let stem = file_name.trim_end_matches(".dist-info");
    let name = header(&headers, "Name").unwrap_or_else(|| strip_version(stem));
    let version = header(&headers, "Version").unwrap_or_else(|| UNKNOWN_VERSION.to_string());

    let files: Vec<PathBuf> = read_optional(&dir.join("RECORD"))?
        .map(|text| parse_record(&text))
        .unwrap_or_default();

    let top_level = match read_optional(&dir.join("top_level.txt"))? {
        Some(text) => parse_top_level(&text),
        None => top_level_from_files(&files),
    };

    let entry_points = read_optional(&dir.join("entry_points.txt"))?
        .map(|text| parse_entry_points(&text))
        .unwrap_or_default();

    let requires = headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("Requires-Dist"))
        .map(|(_, v)| v.clone())
        .collect();

    Ok(Distribution {
        name,
        version,
        top_level,
        files,
        requires,
        entry_points,
        metadata_dir: Some(PathBuf::from(file_name)),
    })
}

fn read_egg_info(dir: &Path, file_name: &str) -> Result<Distribution> {
    let headers = read_optional(&dir.join("PKG-INFO"))?
        .map(|text| parse_headers(&text))
        .unwrap_or_default();
    let stem = file_name.trim_end_matches(".egg-info");

    Ok(Distribution {
        name: header(&headers, "Name").unwrap_or_else(|| strip_version(stem)),
        version: header(&headers, "Version").unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
        top_level: read_optional(&dir.join("top_level.txt"))?
            .map(|text| parse_top_level(&text))
            .unwrap_or_default(),
        files: Vec::new(),
        requires: Vec::new(),
        entry_points: read_optional(&dir.join("entry_points.txt"))?
            .map(|text| parse_entry_points(&text))
            .unwrap_or_default(),
        metadata_dir: Some(PathBuf::from(file_name)),
    })
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).fs_context("reading", path),
    }
}

/// RFC 822 style headers up to the first blank line.
fn parse_headers(text: &str) -> Vec<(String, String)> {
    text.lines()
        .take_while(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with([' ', '\t']))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn header(headers: &[(String, String)], key: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_empty())
        .map(|(_, v)| v.clone())
}

/// `name-1.2.3` -> `name`.
fn strip_version(stem: &str) -> String {
    match stem.rsplit_once('-') {
        Some((name, version)) if version.starts_with(|c: char| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => stem.to_string(),
    }
}

fn parse_top_level(text: &str) -> BTreeSet<String> {
    text.lines()
        .filter_map(|line| line.trim().split(['/', '\\']).next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// First CSV column of each `RECORD` line, keeping only paths that stay
/// inside the install directory.
fn parse_record(text: &str) -> Vec<PathBuf> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let field = if let Some(rest) = line.strip_prefix('"') {
                let mut out = String::new();
                let mut chars = rest.chars().peekable();
                while let Some(c) = chars.next() {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            out.push('"');
                            continue;
                        }
                        break;
                    }
                    out.push(c);
                }
                out
            } else {
                line.split(',').next().unwrap_or_default().to_string()
            };
            let path = PathBuf::from(field);
            path.components()
                .all(|c| matches!(c, Component::Normal(_)))
                .then_some(path)
        })
        .collect()
}

fn top_level_from_files(files: &[PathBuf]) -> BTreeSet<String> {
    files
        .iter()
        .filter_map(|f| {
            let first = f.components().next()?.as_os_str().to_str()?;
            if first.ends_with(".dist-info") || first.ends_with(".data") || first == "__pycache__" {
                return None;
            }
            let is_module_file = f.components().count() == 1;
            let name = if is_module_file {
                if let Some(stem) = first.strip_suffix(".py") {
                    stem
                } else if EXTENSION_SUFFIXES.iter().any(|s| first.ends_with(s)) {
                    first.split('.').next()?
                } else {
                    return None;
                }
            } else {
                let ext = f.extension()?.to_str()?;
                if !matches!(ext, "py" | "so" | "pyd") {
                    return None;
                }
                first
            };
            is_identifier(name).then(|| name.to_string())
        })
        .collect()
}

/// `pkg/sub/mod.py` -> `pkg.sub.mod`, `pkg/sub/__init__.py` -> `pkg.sub`.
fn dotted_module(file: &Path) -> Option<String> {
    if file.extension()? != "py" {
        return None;
    }
    let mut parts = file
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect::<Option<Vec<String>>>()?;
    if parts.last().is_some_and(|p| p == "__init__") {
        parts.pop();
    }
    let importable = !parts.is_empty()
        && parts.iter().all(|p| is_identifier(p))
        && !parts.iter().any(|p| matches!(p.as_str(), "test" | "tests"));
    importable.then(|| parts.join("."))
}

/// Project name at the start of a `Requires-Dist` value such as
/// `websockets>=10.4; extra == "standard"`.
fn requirement_name(requirement: &str) -> Option<&str> {
    let requirement = requirement.trim_start();
    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(requirement.len());
    (end > 0).then(|| &requirement[..end])
}

fn parse_entry_points(text: &str) -> Vec<EntryPointRecord> {
    let mut group = None;
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(['#', ';']) {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            group = Some(name.trim().to_string());
            continue;
        }
        if let (Some(group), Some((name, value))) = (&group, line.split_once('=')) {
            out.push(EntryPointRecord {
                group: group.clone(),
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// Installs a fake wheel: `<name>-<version>.dist-info` plus one package.
    pub(crate) fn install(site: &Path, name: &str, version: &str, modules: &[&str]) {
        let dist_info = site.join(format!("{}-{version}.dist-info", name.replace('-', "_")));
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(
            dist_info.join("METADATA"),
            format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n\nlong description\n"),
        )
        .unwrap();
        fs::write(dist_info.join("top_level.txt"), modules.join("\n")).unwrap();
        let mut record = String::new();
        for module in modules {
            let pkg = site.join(module);
            fs::create_dir_all(&pkg).unwrap();
            fs::write(pkg.join("__init__.py"), "").unwrap();
            record.push_str(&format!("{module}/__init__.py,,\n"));
        }
        record.push_str(&format!(
            "{}/RECORD,,\n",
            dist_info.file_name().unwrap().to_string_lossy()
        ));
        fs::write(dist_info.join("RECORD"), record).unwrap();
    }

    #[test]
    fn indexes_metadata_and_orphans() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "Typing-Extensions", "4.12.2", &["typing_extensions"]);
        install(site.path(), "PyYAML", "6.0.1", &["yaml", "_yaml"]);
        fs::write(site.path().join("six.py"), "").unwrap();
        fs::write(site.path().join("README.txt"), "").unwrap();

        let index = DistributionIndex::scan(site.path()).unwrap();
        assert_eq!(index.len(), 3);

        let yaml = index.get("pyyaml").unwrap();
        assert_eq!(yaml.version(), "6.0.1");
        assert_eq!(index.owners_of("_yaml"), ["pyyaml"]);

        let six = index.get("six").unwrap();
        assert!(six.is_synthetic());
        assert_eq!(six.version(), UNKNOWN_VERSION);
    }

    #[test]
    fn top_level_falls_back_to_record() {
        let site = tempfile::tempdir().unwrap();
        let dist_info = site.path().join("attrs-23.2.0.dist-info");
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(dist_info.join("METADATA"), "Name: attrs\nVersion: 23.2.0\n").unwrap();
        fs::write(
            dist_info.join("RECORD"),
            "attr/__init__.py,sha256=x,1\nattrs/__init__.py,,\n\"attr/odd,name.py\",,\n../../bin/tool,,\nattrs-23.2.0.dist-info/RECORD,,\n",
        )
        .unwrap();

        let index = DistributionIndex::scan(site.path()).unwrap();
        let attrs = index.get("attrs").unwrap();
        assert_eq!(
            attrs.top_level().iter().collect::<Vec<_>>(),
            ["attr", "attrs"]
        );
        assert!(attrs.files().contains(&PathBuf::from("attr/odd,name.py")));
        assert!(!attrs.files().iter().any(|f| f.starts_with("..")));
    }

    #[test]
    fn duplicate_regular_module_is_a_conflict() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "jwt", "1.3.1", &["jwt"]);
        install(site.path(), "PyJWT", "2.8.0", &["jwt"]);

        let index = DistributionIndex::scan(site.path()).unwrap();
        let retained = index.keys();
        let err = index.check_conflicts(&retained).unwrap_err();
        assert!(matches!(err, Error::ModuleConflict { ref module, .. } if module == "jwt"));

        let only_one = BTreeSet::from(["pyjwt".to_string()]);
        index.check_conflicts(&only_one).unwrap();
    }

    #[test]
    fn namespace_packages_may_be_shared() {
        let site = tempfile::tempdir().unwrap();
        for (name, sub) in [("google-auth", "auth"), ("protobuf", "protobuf")] {
            let dist_info = site.path().join(format!("{name}-1.0.dist-info"));
            fs::create_dir_all(&dist_info).unwrap();
            fs::write(dist_info.join("METADATA"), format!("Name: {name}\nVersion: 1.0\n")).unwrap();
            fs::write(dist_info.join("top_level.txt"), "google\n").unwrap();
            fs::write(dist_info.join("RECORD"), format!("google/{sub}/__init__.py,,\n")).unwrap();
            fs::create_dir_all(site.path().join("google").join(sub)).unwrap();
            fs::write(site.path().join("google").join(sub).join("__init__.py"), "").unwrap();
        }

        let index = DistributionIndex::scan(site.path()).unwrap();
        assert!(index.is_namespace("google"));
        index.check_conflicts(&index.keys()).unwrap();

        let paths = index.removal_paths("protobuf");
        assert!(!paths.contains(&site.path().join("google")));
        assert!(paths.contains(&site.path().join("google/protobuf/__init__.py")));
    }

    #[test]
    fn module_names_cover_record_submodules() {
        let site = tempfile::tempdir().unwrap();
        let dist_info = site.path().join("uvicorn-0.30.1.dist-info");
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(dist_info.join("METADATA"), "Name: uvicorn\nVersion: 0.30.1\n").unwrap();
        let files = [
            "uvicorn/__init__.py",
            "uvicorn/protocols/__init__.py",
            "uvicorn/protocols/websockets/auto.py",
            "uvicorn/protocols/websockets/wsproto_impl.py",
            "uvicorn/tests/test_main.py",
            "uvicorn/py.typed",
        ];
        let mut record = String::new();
        for file in files {
            let path = site.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "").unwrap();
            record.push_str(&format!("{file},,\n"));
        }
        record.push_str("uvicorn/removed.py,,\nuvicorn-0.30.1.dist-info/METADATA,,\n");
        fs::write(dist_info.join("RECORD"), record).unwrap();

        let index = DistributionIndex::scan(site.path()).unwrap();
        let names: Vec<String> = index.module_names("uvicorn").into_iter().collect();
        assert_eq!(
            names,
            [
                "uvicorn",
                "uvicorn.protocols",
                "uvicorn.protocols.websockets.auto",
                "uvicorn.protocols.websockets.wsproto_impl",
            ]
        );
        assert!(index.module_names("missing").is_empty());
    }

    #[test]
    fn requirement_closure_follows_installed_requirements() {
        let site = tempfile::tempdir().unwrap();
        install(site.path(), "uvicorn", "0.30.1", &["uvicorn"]);
        install(site.path(), "websockets", "12.0", &["websockets"]);
        install(site.path(), "h11", "0.14.0", &["h11"]);
        install(site.path(), "click", "8.1.7", &["click"]);
        install(site.path(), "pytest", "8.2.2", &["pytest"]);
        let metadata = site.path().join("uvicorn-0.30.1.dist-info/METADATA");
        fs::write(
            &metadata,
            "Name: uvicorn\nVersion: 0.30.1\nRequires-Dist: click>=7.0\nRequires-Dist: h11 (>=0.8)\nRequires-Dist: websockets>=10.4; extra == \"standard\"\nRequires-Dist: httptools>=0.5.0; extra == \"standard\"\n",
        )
        .unwrap();
        fs::write(
            site.path().join("click-8.1.7.dist-info/METADATA"),
            "Name: click\nVersion: 8.1.7\nRequires-Dist: colorama; platform_system == \"Windows\"\nRequires-Dist: uvicorn\n",
        )
        .unwrap();

        let index = DistributionIndex::scan(site.path()).unwrap();
        let closure = index.requirement_closure(&[String::from("Uvicorn"), String::from("absent")]);
        assert_eq!(
            closure.into_iter().collect::<Vec<_>>(),
            ["click", "h11", "uvicorn", "websockets"]
        );
        assert_eq!(requirement_name("  zope.interface[x]>=5"), Some("zope.interface"));
        assert_eq!(requirement_name(";"), None);
    }

    #[test]
    fn entry_points_are_parsed_by_group() {
        let eps = parse_entry_points("[console_scripts]\nuvicorn = uvicorn.main:main\n\n# c\n[x]\na=b\n");
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].group, "console_scripts");
        assert_eq!(eps[0].value, "uvicorn.main:main");
        assert_eq!(eps[1].name, "a");
    }
}
