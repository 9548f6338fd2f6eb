//! Interpreter introspection script and its JSON report.

use serde::Deserialize;

/// Run with `python -I -c`; prints one JSON object on stdout.
pub(super) const PROBE_SCRIPT: &str = r#"
import json, os, pathlib, sys, sysconfig

windows = os.name == "nt"
major, minor = sys.version_info[:2]
digits = f"{major}{minor}"
stdlib = sysconfig.get_path("stdlib")
stdlib_path = pathlib.Path(stdlib) if stdlib else None
base_exe = getattr(sys, "_base_executable", None) or sys.executable

def unique(items):
    seen, out = set(), []
    for item in items:
        if not item:
            continue
        path = pathlib.Path(item)
        try:
            key = path.resolve()
        except OSError:
            continue
        if key not in seen:
            seen.add(key)
            out.append(path)
    return out

names = [sysconfig.get_config_var("LDLIBRARY")]
if windows:
    names += [f"python{digits}.dll", f"python{major}.dll"]
else:
    names += [f"libpython{major}.{minor}.so", f"libpython{major}.{minor}.so.1.0", f"libpython{major}.{minor}.dylib"]

dirs = [sysconfig.get_config_var(k) for k in ("LIBDIR", "BINDIR", "LIBPL")]
dirs += [sys.base_prefix, pathlib.Path(base_exe).parent]
if stdlib_path:
    dirs += [stdlib_path.parent, stdlib_path.parent / "DLLs"]

libpython = None
for directory in unique(dirs):
    for name in filter(None, names):
        candidate = directory / name
        if not candidate.is_file():
            continue
        suffix = "".join(candidate.suffixes).lower()
        if windows and not suffix.endswith(".dll"):
            continue
        if not windows and ".so" not in suffix and not suffix.endswith(".dylib"):
            continue
        libpython = str(candidate)
        break
    if libpython:
        break

archive = None
for directory in unique([stdlib_path, stdlib_path and stdlib_path.parent, sys.base_prefix,
                         pathlib.Path(sys.base_prefix) / "lib", pathlib.Path(base_exe).parent]):
    candidate = directory / f"python{digits}.zip"
    if candidate.is_file():
        archive = str(candidate)
        break

dlls = None
if windows:
    for directory in unique([pathlib.Path(sys.base_prefix) / "DLLs", pathlib.Path(base_exe).parent / "DLLs"]):
        if directory.is_dir():
            dlls = str(directory)
            break

print(json.dumps({
    "version": sys.version.split()[0],
    "version_info": list(sys.version_info[:3]),
    "platform": "windows" if windows else "posix",
    "executable": os.path.realpath(base_exe),
    "prefix": sys.base_prefix,
    "stdlib": stdlib,
    "libpython": libpython,
    "stdlib_zip": archive,
    "dlls_dir": dlls,
    "builtins": sorted(sys.builtin_module_names),
}))
"#;

/// Raw probe output.
#[derive(Debug, Deserialize)]
pub(super) struct ProbeReport {
    pub version: String,
    pub version_info: (u64, u64, u64),
    pub platform: String,
    pub executable: String,
    pub prefix: String,
    pub stdlib: Option<String>,
    pub libpython: Option<String>,
    pub stdlib_zip: Option<String>,
    pub dlls_dir: Option<String>,
    #[serde(default)]
    pub builtins: Vec<String>,
}
