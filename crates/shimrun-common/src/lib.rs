//! Common types, errors, and configuration for shimrun.
//!
//! This crate provides shared functionality used across the shimrun workspace:
//! - Error taxonomy using `thiserror` for every failure of the bootstrap
//! - Configuration structures for the engine, the run, and the capabilities
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{CapabilityConfig, DecodePolicy, EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, LogConfig, LogFormat};
pub use error::RuntimeError;
