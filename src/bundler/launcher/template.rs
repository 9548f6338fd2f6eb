//! Launcher and runtime shim templates.

/// POSIX `sh` launcher written to `<root>/run`.
pub const POSIX_LAUNCHER: &str = r#"#!/bin/sh
# Generated by shrinkwrap {{tool_version}} for {{entry}}. Do not edit.
set -e

ROOT="$(cd "$(dirname "$0")" && pwd -P)"
RUNTIME="$ROOT/runtime"

export PYTHONHOME="$RUNTIME"
PYTHONPATH="$ROOT/meta"
{{#if zip_imports}}
PYTHONPATH="$PYTHONPATH:$ROOT/bundle.pyz/app:$ROOT/bundle.pyz/site-packages"
{{/if}}
{{#if stdlib_archive}}
PYTHONPATH="$PYTHONPATH:$RUNTIME/lib/{{stdlib_archive}}"
{{/if}}
PYTHONPATH="$PYTHONPATH:$ROOT/app:$ROOT/site-packages"
export PYTHONPATH
export PYTHONNOUSERSITE=1
{{#if block_packaging}}
export PYTHONDONTWRITEBYTECODE=1
export PYTHONZIPIMPORT_USE_ZIPFILE=1
{{/if}}
export LD_LIBRARY_PATH="$RUNTIME/lib${LD_LIBRARY_PATH:+:$LD_LIBRARY_PATH}"
export DYLD_LIBRARY_PATH="$RUNTIME/lib${DYLD_LIBRARY_PATH:+:$DYLD_LIBRARY_PATH}"

if [ -z "${HOST:-}" ]; then HOST="{{default_host}}"; fi
if [ -z "${PORT:-}" ]; then PORT="{{default_port}}"; fi

exec "$RUNTIME/bin/python" -s -m {{server}} "{{entry}}" --host "$HOST" --port "$PORT" "$@"
"#;

/// Windows launcher written to `<root>\run.bat`.
pub const WINDOWS_LAUNCHER: &str = r#"@echo off
rem Generated by shrinkwrap {{tool_version}} for {{entry}}. Do not edit.
setlocal

set "ROOT=%~dp0"
set "ROOT=%ROOT:~0,-1%"
set "RUNTIME=%ROOT%\runtime"

set "PYTHONHOME=%RUNTIME%"
set "PYTHONPATH=%ROOT%\meta"
{{#if zip_imports}}
set "PYTHONPATH=%PYTHONPATH%;%ROOT%\bundle.pyz\app;%ROOT%\bundle.pyz\site-packages"
{{/if}}
{{#if stdlib_archive}}
set "STDLIB_ZIP={{stdlib_archive}}"
set "PYTHONPATH=%PYTHONPATH%;%RUNTIME%\%STDLIB_ZIP%"
{{/if}}
set "PYTHONPATH=%PYTHONPATH%;%ROOT%\app;%ROOT%\site-packages"
set PYTHONNOUSERSITE=1
{{#if block_packaging}}
set PYTHONDONTWRITEBYTECODE=1
set PYTHONZIPIMPORT_USE_ZIPFILE=1
{{/if}}
set "PATH=%RUNTIME%;%PATH%"

if not defined HOST set "HOST={{default_host}}"
if not defined PORT set "PORT={{default_port}}"

"%RUNTIME%\python.exe" -s -m {{server}} "{{entry}}" --host "%HOST%" --port "%PORT%" %*
exit /b %ERRORLEVEL%
"#;

/// `meta/sitecustomize.py`, imported by `site` at interpreter start-up.
///
/// Installs the packaging guard and the frozen metadata hooks for the
/// lifetime of the process; nothing is ever uninstalled.
pub const SITECUSTOMIZE: &str = r#"# Generated by shrinkwrap {{tool_version}}. Do not edit.
import json
import os
import re
import sys
from pathlib import Path

os.environ.setdefault("PYTHONNOUSERSITE", "1")
{{#if block_packaging}}
os.environ.setdefault("PYTHONDONTWRITEBYTECODE", "1")
os.environ.setdefault("PYTHONZIPIMPORT_USE_ZIPFILE", "1")
sys.dont_write_bytecode = True

_BLOCKED = ("pip", "ensurepip")


class _PackagingGuard:
    def find_spec(self, fullname, path=None, target=None):
        if fullname.partition(".")[0] in _BLOCKED:
            raise ImportError(fullname + " is disabled inside this bundle", name=fullname)
        return None


for _name in [_n for _n in sys.modules if _n.partition(".")[0] in _BLOCKED]:
    del sys.modules[_name]
sys.meta_path.insert(0, _PackagingGuard())
{{/if}}
{{#if freeze_metadata}}

import importlib.metadata as _metadata
from importlib.metadata import EntryPoint, EntryPoints, PackageNotFoundError

try:
    _FROZEN = json.loads(Path(__file__).with_name("{{snapshot_name}}").read_text("utf-8"))
except (OSError, ValueError):
    _FROZEN = None


def _key(name):
    return re.sub(r"[-_.]+", "-", name).lower()


def _record(name):
    record = _FROZEN.get(_key(name)) if _FROZEN else None
    if record is None:
        raise PackageNotFoundError(name)
    return record


def _entry_points_of(record):
    return [EntryPoint(ep["name"], ep["value"], ep["group"]) for ep in record.get("entry_points", [])]


class _FrozenDistribution(_metadata.Distribution):
    def __init__(self, record):
        self._frozen = record

    @property
    def name(self):
        return self._frozen["name"]

    @property
    def version(self):
        return self._frozen["version"]

    @property
    def entry_points(self):
        return EntryPoints(_entry_points_of(self._frozen))

    @property
    def requires(self):
        return self._frozen.get("requires") or None

    @property
    def files(self):
        return None

    @property
    def metadata(self):
        from email.message import Message

        message = Message()
        message["Name"] = self.name
        message["Version"] = self.version
        for requirement in self._frozen.get("requires", []):
            message["Requires-Dist"] = requirement
        return message

    def read_text(self, filename):
        return None

    def locate_file(self, path):
        return Path(path)


if _FROZEN:
    _original_distribution = _metadata.distribution
    _original_version = _metadata.version
    _original_entry_points = _metadata.entry_points

    def distribution(name):
        try:
            return _FrozenDistribution(_record(name))
        except PackageNotFoundError:
            return _original_distribution(name)

    def distributions(**kwargs):
        return iter([_FrozenDistribution(record) for record in _FROZEN.values()])

    def version(name):
        try:
            return _record(name)["version"]
        except PackageNotFoundError:
            return _original_version(name)

    def entry_points(**params):
        found = []
        for record in _FROZEN.values():
            for ep in _entry_points_of(record):
                if all(getattr(ep, key, None) == value for key, value in params.items()):
                    found.append(ep)
        if not found:
            return _original_entry_points(**params)
        return EntryPoints(found)

    def packages_distributions():
        mapping = {}
        for record in _FROZEN.values():
            for package in record.get("packages", []):
                mapping.setdefault(package, []).append(record["name"])
        return mapping

    _metadata.distribution = distribution
    _metadata.distributions = distributions
    _metadata.version = version
    _metadata.entry_points = entry_points
    _metadata.packages_distributions = packages_distributions
{{/if}}
"#;
