//! Bytecode compilation and source stripping.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Compiles each listed source to a legacy `.pyc` beside it and exits
/// non-zero after the first failure, printing `path<TAB>message` on stderr.
const COMPILE_SCRIPT: &str = r#"
import os, py_compile, sys
root, level, listing = sys.argv[1], int(sys.argv[2]), sys.argv[3]
with open(listing, encoding="utf-8") as handle:
    sources = [line.rstrip("\n") for line in handle if line.strip()]
for source in sources:
    try:
        py_compile.compile(source, cfile=source[:-3] + ".pyc",
                           dfile=os.path.relpath(source, root),
                           optimize=level, doraise=True)
    except py_compile.PyCompileError as exc:
        message = " ".join(str(exc.msg).split())
        sys.stderr.write(f"{source}\t{message}\n")
        sys.exit(1)
"#;

/// Turns source modules into bytecode.
///
/// Implementations must either produce a non-empty `.pyc` next to every
/// source or fail; a partial result is never reported as success.
pub trait BytecodeCompiler: Send + Sync {
    /// Compiles `sources`, all located under `root`.
    fn compile(&self, root: &Path, sources: &[PathBuf]) -> Result<()>;
}

/// `-OO`: asserts and docstrings are compiled out.
const OPTIMIZE_LEVEL: u8 = 2;

/// Compiles with the bundled interpreter's own `py_compile`.
#[derive(Debug, Clone)]
pub struct PythonCompiler {
    python: PathBuf,
    workers: usize,
}

impl PythonCompiler {
    /// Compiler running `python` at optimization level 2, one process per CPU.
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            workers: num_cpus::get().clamp(1, 32),
        }
    }

    fn compile_chunk(&self, root: &Path, sources: &[PathBuf]) -> Result<()> {
        let mut listing = tempfile::NamedTempFile::new().fs_context("creating temp file", std::env::temp_dir())?;
        for source in sources {
            writeln!(listing, "{}", source.display()).fs_context("writing", listing.path().to_path_buf())?;
        }
        listing.flush().fs_context("writing", listing.path().to_path_buf())?;

        let output = Command::new(&self.python)
            .args(["-I", "-c", COMPILE_SCRIPT])
            .arg(root)
            .arg(OPTIMIZE_LEVEL.to_string())
            .arg(listing.path())
            .output()
            .map_err(|error| Error::CommandFailed {
                command: self.python.display().to_string(),
                error,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        match stderr.lines().find_map(|l| l.split_once('\t')) {
            Some((path, message)) => Err(Error::CompileFailed {
                path: PathBuf::from(path),
                message: message.to_string(),
            }),
            None => Err(Error::ProcessFailed {
                command: format!("{} -m py_compile", self.python.display()),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            }),
        }
    }
}

impl BytecodeCompiler for PythonCompiler {
    fn compile(&self, root: &Path, sources: &[PathBuf]) -> Result<()> {
        if sources.is_empty() {
            return Ok(());
        }
        let chunk = sources.len().div_ceil(self.workers).max(1);
        log::debug!(
            "Compiling {} modules under {} in chunks of {chunk}",
            sources.len(),
            root.display()
        );

        std::thread::scope(|scope| {
            let handles: Vec<_> = sources
                .chunks(chunk)
                .map(|part| scope.spawn(move || self.compile_chunk(root, part)))
                .collect();
            for handle in handles {
                handle
                    .join()
                    .map_err(|_| Error::GenericError("bytecode compiler worker panicked".into()))??;
            }
            Ok(())
        })
    }
}

/// Every `.py` file under `root`, sorted.
pub fn list_sources(root: &Path) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "py"))
        .map(|e| e.into_path())
        .collect();
    sources.sort();
    sources
}

/// Deletes each `.py` under `root` whose sibling `.pyc` exists and is
/// non-empty. Returns `(sources_removed, bytes_reclaimed)`.
pub fn strip_sources(root: &Path) -> Result<(u64, u64)> {
    let mut removed = 0;
    let mut bytes = 0;
    for source in list_sources(root) {
        let compiled = source.with_extension("pyc");
        let has_bytecode = std::fs::metadata(&compiled).is_ok_and(|m| m.is_file() && m.len() > 0);
        if !has_bytecode {
            log::debug!("Keeping {}: no bytecode", source.display());
            continue;
        }
        let size = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
        std::fs::remove_file(&source).fs_context("removing source", &source)?;
        removed += 1;
        bytes += size;
    }
    Ok((removed, bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// Writes a fixed marker as bytecode; fails on sources containing `!!`.
    pub(crate) struct FakeCompiler;

    impl BytecodeCompiler for FakeCompiler {
        fn compile(&self, _root: &Path, sources: &[PathBuf]) -> Result<()> {
            for source in sources {
                let text = fs::read_to_string(source).unwrap();
                if text.contains("!!") {
                    return Err(Error::CompileFailed {
                        path: source.clone(),
                        message: "invalid syntax".into(),
                    });
                }
                fs::write(source.with_extension("pyc"), b"\x00bytecode").unwrap();
            }
            Ok(())
        }
    }

    #[test]
    fn sources_without_bytecode_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/a.py"), "x = 1\n").unwrap();
        fs::write(root.join("pkg/b.py"), "y = 2\n").unwrap();
        fs::write(root.join("pkg/c.py"), "z = 3\n").unwrap();

        FakeCompiler
            .compile(root, &[root.join("pkg/__init__.py"), root.join("pkg/a.py")])
            .unwrap();
        fs::write(root.join("pkg/b.pyc"), b"").unwrap();

        let (removed, bytes) = strip_sources(root).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(bytes, 6);
        assert!(!root.join("pkg/a.py").exists());
        assert!(root.join("pkg/b.py").exists());
        assert!(root.join("pkg/c.py").exists());
        assert_eq!(list_sources(root).len(), 2);
    }

    #[test]
    fn interpreter_compiles_and_reports_syntax_errors() {
        let Ok(python) = which::which("python3") else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("good.py"), "VALUE = 1\n").unwrap();
        let compiler = PythonCompiler::new(&python);
        compiler.compile(root, &[root.join("good.py")]).unwrap();
        assert!(fs::metadata(root.join("good.pyc")).unwrap().len() > 0);

        fs::write(root.join("bad.py"), "def broken(:\n").unwrap();
        let err = compiler.compile(root, &[root.join("bad.py")]).unwrap_err();
        assert!(matches!(err, Error::CompileFailed { .. }));
        assert!(root.join("bad.py").exists());
    }
}
