//! Module images and their compiled form.
//!
//! - [`ModuleImage`]: the raw, immutable bytes of a module, read once
//! - [`CompiledModule`]: the image validated and compiled by Wasmtime
//!
//! Loading never exposes a partial image: the bytes are read in full through
//! the [`Filesystem`] capability or the load fails.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmtime::{Engine, Module};

use crate::capability::Filesystem;
use shimrun_common::RuntimeError;

/// Size of the preamble: `\0asm` magic plus a 4-byte version.
const PREAMBLE_LEN: usize = 8;

/// Immutable bytes of a compiled module.
#[derive(Clone)]
pub struct ModuleImage {
    bytes: Arc<[u8]>,
    source: Option<PathBuf>,
    content_hash: String,
}

impl ModuleImage {
    /// Read the image at `path` in full.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] if the file is missing or unreadable.
    #[instrument(skip(fs, path), fields(path = %path.as_ref().display()))]
    pub fn load(fs: &dyn Filesystem, path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let bytes = fs.read_file(path)?;

        let mut image = Self::from_bytes(bytes);
        image.source = Some(path.to_path_buf());

        debug!(
            len = image.len(),
            content_hash = %image.content_hash,
            "Module image loaded"
        );
        Ok(image)
    }

    /// Wrap bytes already in memory.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let content_hash = compute_hash(&bytes);
        Self {
            bytes,
            source: None,
            content_hash,
        }
    }

    /// The image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the image has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Path the image was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Hash of the image bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

impl std::fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleImage")
            .field("len", &self.bytes.len())
            .field("source", &self.source)
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

/// A validated, compiled WebAssembly module.
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,

    /// Hash of the original Wasm bytes.
    content_hash: String,

    /// When this module was compiled.
    compiled_at: Instant,
}

impl CompiledModule {
    /// Validate and compile a module image.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Validation`] if the bytes are not a
    /// structurally valid WebAssembly module.
    #[instrument(skip(engine, image), fields(bytes_len = image.len()))]
    pub fn from_image(engine: &Engine, image: &ModuleImage) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(image.bytes())?;

        let module = Module::from_binary(engine, image.bytes())
            .map_err(|e| RuntimeError::validation(format!("{e:#}")))?;

        let duration = start.elapsed();

        info!(
            content_hash = %image.content_hash(),
            duration_ms = duration.as_millis(),
            imports = module.imports().len(),
            "Module compiled"
        );

        Ok(Self {
            module,
            content_hash: image.content_hash().to_string(),
            compiled_at: Instant::now(),
        })
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or validate.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let module = Module::new(engine, wat)
            .map_err(|e| RuntimeError::validation(format!("WAT compilation failed: {e:#}")))?;

        Ok(Self {
            module,
            content_hash: compute_hash(wat.as_bytes()),
            compiled_at: Instant::now(),
        })
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.module
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get when this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    /// `(namespace, name)` of every import, in declaration order.
    pub fn imports(&self) -> impl Iterator<Item = (&str, &str)> {
        self.module.imports().map(|import| (import.module(), import.name()))
    }

    /// Validate the WebAssembly preamble (magic number and version).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < PREAMBLE_LEN {
            return Err(RuntimeError::validation("Invalid Wasm: file too small"));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::validation("Invalid Wasm: bad magic number"));
        }

        if bytes[4..8] != [0x01, 0x00, 0x00, 0x00] {
            return Err(RuntimeError::validation(
                "Invalid Wasm: unsupported version (components are not modules)",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
