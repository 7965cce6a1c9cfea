//! Runtime glue for shimrun.
//!
//! This crate provides the host functions a module compiled for the browser
//! expects its environment to supply. Guest modules import them by
//! `(namespace, name)`; [`linker::import_object`] builds an
//! [`ImportObject`](shimrun_core::ImportObject) holding all of them.
//!
//! # Interfaces
//!
//! - [`shim`]: the capability shim (`host::*`)
//! - [`runtime`]: callback scheduling and exit (`runtime::*`)
//! - [`memory`]: bounds-checked access to guest linear memory
//!
//! # Guest ABI
//!
//! Pointers and lengths are `i32` offsets into the guest's exported
//! `memory`. An out-of-bounds access traps.
//!
//! | Import | Signature |
//! |--------|-----------|
//! | `host::secureRandom` | `(ptr, len)` |
//! | `host::monotonicClockMillis` | `() -> f64` |
//! | `host::textDecode` | `(src, src_len, dst, dst_cap) -> i32` |
//! | `host::textEncode` | `(src, units, dst, dst_cap) -> i32` |
//! | `host::fsFileSize` | `(path, path_len) -> i64` |
//! | `host::fsReadFile` | `(path, path_len, dst, dst_cap) -> i64` |
//! | `host::fsWrite` | `(fd, ptr, len) -> i32` |
//! | `runtime::scheduleCallback` | `(delay_ms: f64) -> i32` |
//! | `runtime::clearCallback` | `(id) -> i32` |
//! | `runtime::exit` | `(code)` |

pub mod linker;
pub mod memory;
pub mod runtime;
pub mod shim;

pub use linker::{import_object, register_all};
pub use shim::CapabilityShim;
