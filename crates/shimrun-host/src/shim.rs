//! The capability shim.
//!
//! [`CapabilityShim`] installs a [`CapabilitySet`] into an [`ImportObject`]
//! as host functions under the `host` namespace. Each function closes over
//! the shared set, so the guest sees exactly the bindings the shim was built
//! with.
//!
//! Return conventions for functions that write into a guest buffer:
//! - `n >= 0`: bytes written
//! - `-1`: the host operation failed (file missing or unreadable)
//! - `-2`: the destination buffer is too small; nothing was written

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use wasmtime::{Caller, Linker};

use shimrun_common::{DecodePolicy, RuntimeError};
use shimrun_core::capability::TextCodec;
use shimrun_core::{CapabilitySet, ImportObject, RunContext};

use crate::memory::{guest_memory, guest_range, read_bytes, read_utf16, write_bounded};

/// Namespace the capability functions are registered under.
pub const HOST_NAMESPACE: &str = "host";

/// `(ptr, len)`: fill guest memory with secure random bytes.
pub const SECURE_RANDOM: &str = "secureRandom";

/// `() -> f64`: read the monotonic clock.
pub const MONOTONIC_CLOCK_MILLIS: &str = "monotonicClockMillis";

/// `(src, src_len, dst, dst_cap) -> i32`: decode UTF-8 into `dst`.
pub const TEXT_DECODE: &str = "textDecode";

/// `(src, units, dst, dst_cap) -> i32`: encode UTF-16 code units as UTF-8.
pub const TEXT_ENCODE: &str = "textEncode";

/// `(path, path_len) -> i64`: size of a file.
pub const FS_FILE_SIZE: &str = "fsFileSize";

/// `(path, path_len, dst, dst_cap) -> i64`: read a whole file into `dst`.
pub const FS_READ_FILE: &str = "fsReadFile";

/// `(fd, ptr, len) -> i32`: write to stdout or stderr.
pub const FS_WRITE: &str = "fsWrite";

/// Every import the shim provides.
pub const IMPORTS: [&str; 7] = [
    SECURE_RANDOM,
    MONOTONIC_CLOCK_MILLIS,
    TEXT_DECODE,
    TEXT_ENCODE,
    FS_FILE_SIZE,
    FS_READ_FILE,
    FS_WRITE,
];

const IO_FAILED: i32 = -1;
const BUFFER_TOO_SMALL: i32 = -2;

/// Installs a capability set as host functions.
#[derive(Debug, Clone)]
pub struct CapabilityShim {
    capabilities: Arc<CapabilitySet>,
}

impl CapabilityShim {
    /// Create a shim for `capabilities`.
    pub fn new(capabilities: Arc<CapabilitySet>) -> Self {
        Self { capabilities }
    }

    /// The capability set this shim installs.
    pub fn capabilities(&self) -> &Arc<CapabilitySet> {
        &self.capabilities
    }

    /// Register every capability function in `imports`.
    ///
    /// Either all functions are installed or, on error, `imports` is left
    /// as it was. Installing the same shim twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if Wasmtime rejects a
    /// definition.
    pub fn install(&self, imports: &mut ImportObject) -> Result<(), RuntimeError> {
        imports.install(|linker| {
            self.define_random(linker)?;
            self.define_clock(linker)?;
            self.define_codec(linker)?;
            self.define_filesystem(linker)
        })?;

        debug!(
            namespace = HOST_NAMESPACE,
            functions = IMPORTS.len(),
            "Capability shim installed"
        );
        Ok(())
    }

    fn define_random(&self, linker: &mut Linker<RunContext>) -> Result<(), RuntimeError> {
        let caps = Arc::clone(&self.capabilities);
        linker
            .func_wrap(
                HOST_NAMESPACE,
                SECURE_RANDOM,
                move |mut caller: Caller<'_, RunContext>,
                      ptr: i32,
                      len: i32|
                      -> wasmtime::Result<()> {
                    let memory = guest_memory(&mut caller)?;
                    let data = memory.data_mut(&mut caller);
                    let range = guest_range(ptr, len, data.len())?;

                    caps.secure_random(&mut data[range])
                        .map_err(wasmtime::Error::new)
                },
            )
            .map_err(|e| registration_failed(SECURE_RANDOM, &e))?;
        Ok(())
    }

    fn define_clock(&self, linker: &mut Linker<RunContext>) -> Result<(), RuntimeError> {
        let caps = Arc::clone(&self.capabilities);
        linker
            .func_wrap(HOST_NAMESPACE, MONOTONIC_CLOCK_MILLIS, move || {
                caps.monotonic_clock_millis()
            })
            .map_err(|e| registration_failed(MONOTONIC_CLOCK_MILLIS, &e))?;
        Ok(())
    }

    fn define_codec(&self, linker: &mut Linker<RunContext>) -> Result<(), RuntimeError> {
        let caps = Arc::clone(&self.capabilities);
        linker
            .func_wrap(
                HOST_NAMESPACE,
                TEXT_DECODE,
                move |mut caller: Caller<'_, RunContext>,
                      src: i32,
                      src_len: i32,
                      dst: i32,
                      dst_cap: i32|
                      -> wasmtime::Result<i32> {
                    let memory = guest_memory(&mut caller)?;
                    let bytes = read_bytes(&caller, &memory, src, src_len)?;

                    // Malformed input under the strict policy ends the run
                    let text = caps
                        .text_decoder()
                        .decode(&bytes)
                        .map_err(wasmtime::Error::new)?;

                    let written =
                        write_bounded(&mut caller, &memory, dst, dst_cap, text.as_bytes())?;
                    to_i32(written)
                },
            )
            .map_err(|e| registration_failed(TEXT_DECODE, &e))?;

        let caps = Arc::clone(&self.capabilities);
        linker
            .func_wrap(
                HOST_NAMESPACE,
                TEXT_ENCODE,
                move |mut caller: Caller<'_, RunContext>,
                      src: i32,
                      units: i32,
                      dst: i32,
                      dst_cap: i32|
                      -> wasmtime::Result<i32> {
                    let memory = guest_memory(&mut caller)?;
                    let code_units = read_utf16(&caller, &memory, src, units)?;

                    let bytes = caps
                        .text_encoder()
                        .encode_utf16(&code_units)
                        .map_err(wasmtime::Error::new)?;

                    let written = write_bounded(&mut caller, &memory, dst, dst_cap, &bytes)?;
                    to_i32(written)
                },
            )
            .map_err(|e| registration_failed(TEXT_ENCODE, &e))?;

        Ok(())
    }

    fn define_filesystem(&self, linker: &mut Linker<RunContext>) -> Result<(), RuntimeError> {
        let caps = Arc::clone(&self.capabilities);
        linker
            .func_wrap(
                HOST_NAMESPACE,
                FS_FILE_SIZE,
                move |mut caller: Caller<'_, RunContext>,
                      path: i32,
                      path_len: i32|
                      -> wasmtime::Result<i64> {
                    let memory = guest_memory(&mut caller)?;
                    let raw = read_bytes(&caller, &memory, path, path_len)?;
                    let Some(path) = decode_path(&raw) else {
                        return Ok(i64::from(IO_FAILED));
                    };

                    match caps.filesystem().file_size(Path::new(path.as_str())) {
                        Ok(size) => Ok(i64::try_from(size)?),
                        Err(e) => {
                            warn!(%path, error = %e, "Guest file size query failed");
                            Ok(i64::from(IO_FAILED))
                        }
                    }
                },
            )
            .map_err(|e| registration_failed(FS_FILE_SIZE, &e))?;

        let caps = Arc::clone(&self.capabilities);
        linker
            .func_wrap(
                HOST_NAMESPACE,
                FS_READ_FILE,
                move |mut caller: Caller<'_, RunContext>,
                      path: i32,
                      path_len: i32,
                      dst: i32,
                      dst_cap: i32|
                      -> wasmtime::Result<i64> {
                    let memory = guest_memory(&mut caller)?;
                    let raw = read_bytes(&caller, &memory, path, path_len)?;
                    let Some(path) = decode_path(&raw) else {
                        return Ok(i64::from(IO_FAILED));
                    };

                    let contents = match caps.filesystem().read_file(Path::new(path.as_str())) {
                        Ok(contents) => contents,
                        Err(e) => {
                            warn!(%path, error = %e, "Guest file read failed");
                            return Ok(i64::from(IO_FAILED));
                        }
                    };

                    match write_bounded(&mut caller, &memory, dst, dst_cap, &contents)? {
                        Some(n) => Ok(i64::try_from(n)?),
                        None => Ok(i64::from(BUFFER_TOO_SMALL)),
                    }
                },
            )
            .map_err(|e| registration_failed(FS_READ_FILE, &e))?;

        let caps = Arc::clone(&self.capabilities);
        linker
            .func_wrap(
                HOST_NAMESPACE,
                FS_WRITE,
                move |mut caller: Caller<'_, RunContext>,
                      fd: i32,
                      ptr: i32,
                      len: i32|
                      -> wasmtime::Result<i32> {
                    let memory = guest_memory(&mut caller)?;
                    let bytes = read_bytes(&caller, &memory, ptr, len)?;

                    match caps.filesystem().write_fd(fd, &bytes) {
                        Ok(n) => Ok(i32::try_from(n)?),
                        Err(e) => {
                            warn!(fd, error = %e, "Guest write failed");
                            Ok(IO_FAILED)
                        }
                    }
                },
            )
            .map_err(|e| registration_failed(FS_WRITE, &e))?;

        Ok(())
    }
}

/// Paths are always decoded strictly, whatever the configured policy.
fn decode_path(raw: &[u8]) -> Option<String> {
    match TextCodec::new(DecodePolicy::Strict).decoder().decode(raw) {
        Ok(path) => Some(path.into_owned()),
        Err(e) => {
            warn!(error = %e, "Guest path is not valid UTF-8");
            None
        }
    }
}

fn to_i32(written: Option<usize>) -> wasmtime::Result<i32> {
    match written {
        Some(n) => Ok(i32::try_from(n)?),
        None => Ok(BUFFER_TOO_SMALL),
    }
}

fn registration_failed(name: &str, err: &wasmtime::Error) -> RuntimeError {
    RuntimeError::invalid_config(format!(
        "Failed to register {HOST_NAMESPACE}::{name}: {err}"
    ))
}
