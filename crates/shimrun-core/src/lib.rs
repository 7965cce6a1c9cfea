//! Capability shim and module loader/runner for shimrun.
//!
//! This crate provides the host side of running a browser-targeted module:
//! - [`CapabilitySet`]: Random bytes, monotonic clock, text codec, filesystem
//! - [`WasmEngine`]: Configured Wasmtime engine
//! - [`ModuleImage`] / [`CompiledModule`]: Raw and validated module bytes
//! - [`ImportObject`]: Host functions offered to the module
//! - [`Loader`] / [`RunHandle`]: Instantiation and the callback-driven run loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    CapabilitySet                        │
//! │  (Built once, shared read-only via Arc)                 │
//! │  - secureRandom, monotonicClockMillis                   │
//! │  - textEncoder / textDecoder, filesystem                │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │        ModuleImage ──▶ CompiledModule + ImportObject    │
//! │  - Full read through the filesystem capability          │
//! │  - Validation, then every import checked                │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           RunHandle (Store<RunContext> + Instance)      │
//! │  - Entry point call                                     │
//! │  - CallbackQueue drained until exit or empty            │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod capability;
pub mod engine;
pub mod events;
pub mod imports;
pub mod instance;
pub mod module;
pub mod store;

pub use capability::CapabilitySet;
pub use engine::WasmEngine;
pub use events::{CallbackQueue, ScheduledCallback};
pub use imports::ImportObject;
pub use instance::{Loader, RunHandle, RunOutcome};
pub use module::{CompiledModule, ModuleImage};
pub use store::{RunContext, RunMetrics};
