//! Filesystem access.
//!
//! [`Filesystem`] is the handle both the loader (to read the module image)
//! and the guest (through host functions) use for file I/O.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::trace;

use shimrun_common::RuntimeError;

/// Standard output descriptor.
pub const STDOUT_FD: i32 = 1;

/// Standard error descriptor.
pub const STDERR_FD: i32 = 2;

/// Synchronous file I/O.
pub trait Filesystem: Send + Sync {
    /// Read a whole file. Never returns partial contents.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, RuntimeError>;

    /// Size of a file in bytes.
    fn file_size(&self, path: &Path) -> Result<u64, RuntimeError>;

    /// Write to an output descriptor (`1` stdout, `2` stderr).
    ///
    /// Returns the number of bytes written, which is always `bytes.len()`
    /// on success.
    fn write_fd(&self, fd: i32, bytes: &[u8]) -> Result<usize, RuntimeError>;
}

fn unsupported_fd(fd: i32) -> RuntimeError {
    RuntimeError::io(
        format!("fd {fd}"),
        io::Error::new(io::ErrorKind::InvalidInput, "unsupported file descriptor"),
    )
}

/// Delegates to the host's native file I/O.
#[derive(Debug, Clone, Default)]
pub struct NativeFilesystem {
    root: Option<PathBuf>,
}

impl NativeFilesystem {
    /// Create a filesystem resolving relative paths against the working
    /// directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem resolving relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, Path> {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path).into(),
            _ => path.into(),
        }
    }
}

impl Filesystem for NativeFilesystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, RuntimeError> {
        let resolved = self.resolve(path);
        let bytes = std::fs::read(&resolved)
            .map_err(|e| RuntimeError::io(resolved.display().to_string(), e))?;

        trace!(path = %resolved.display(), len = bytes.len(), "File read");
        Ok(bytes)
    }

    fn file_size(&self, path: &Path) -> Result<u64, RuntimeError> {
        let resolved = self.resolve(path);
        let metadata = std::fs::metadata(&resolved)
            .map_err(|e| RuntimeError::io(resolved.display().to_string(), e))?;

        if !metadata.is_file() {
            return Err(RuntimeError::io(
                resolved.display().to_string(),
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(metadata.len())
    }

    fn write_fd(&self, fd: i32, bytes: &[u8]) -> Result<usize, RuntimeError> {
        let result = match fd {
            STDOUT_FD => {
                let mut out = io::stdout().lock();
                out.write_all(bytes).and_then(|()| out.flush())
            }
            STDERR_FD => io::stderr().lock().write_all(bytes),
            _ => return Err(unsupported_fd(fd)),
        };

        result.map_err(|e| RuntimeError::io(format!("fd {fd}"), e))?;
        Ok(bytes.len())
    }
}

/// In-memory filesystem with captured output.
///
/// The file table is fixed at construction; writes to stdout and stderr are
/// recorded instead of reaching the process streams.
#[derive(Debug, Default)]
pub struct MemoryFilesystem {
    files: HashMap<PathBuf, Vec<u8>>,
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
}

impl MemoryFilesystem {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Everything written to stdout so far.
    pub fn stdout(&self) -> Vec<u8> {
        self.stdout.lock().clone()
    }

    /// Everything written to stderr so far.
    pub fn stderr(&self) -> Vec<u8> {
        self.stderr.lock().clone()
    }

    fn lookup(&self, path: &Path) -> Result<&Vec<u8>, RuntimeError> {
        self.files.get(path).ok_or_else(|| {
            RuntimeError::io(
                path.display().to_string(),
                io::Error::new(io::ErrorKind::NotFound, "no such file"),
            )
        })
    }
}

impl Filesystem for MemoryFilesystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, RuntimeError> {
        self.lookup(path).cloned()
    }

    fn file_size(&self, path: &Path) -> Result<u64, RuntimeError> {
        self.lookup(path).map(|contents| contents.len() as u64)
    }

    fn write_fd(&self, fd: i32, bytes: &[u8]) -> Result<usize, RuntimeError> {
        let sink = match fd {
            STDOUT_FD => &self.stdout,
            STDERR_FD => &self.stderr,
            _ => return Err(unsupported_fd(fd)),
        };
        sink.lock().extend_from_slice(bytes);
        Ok(bytes.len())
    }
}
