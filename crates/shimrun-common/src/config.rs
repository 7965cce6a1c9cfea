//! Configuration structures for shimrun.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (fuel, stack, compilation)
//! - [`ExecutionConfig`]: Per-run settings (entry point, callback export, fuel)
//! - [`CapabilityConfig`]: Capability shim settings (decode policy, fs root)

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// This structure contains all configuration options for one run.
/// It can be loaded from a TOML file and overridden from the command line.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-run execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Capability shim configuration.
    #[serde(default)]
    pub capabilities: CapabilityConfig,
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable fuel metering for deterministic CPU limiting.
    ///
    /// The limit itself is [`ExecutionConfig::max_fuel`].
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Maximum native stack the guest may use, in kilobytes.
    ///
    /// Modules compiled from garbage-collected languages tend to recurse
    /// deeply during runtime initialization.
    #[serde(default = "defaults::max_wasm_stack_kb")]
    pub max_wasm_stack_kb: u32,

    /// Compile functions on multiple threads.
    #[serde(default = "defaults::parallel_compilation")]
    pub parallel_compilation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_metering: defaults::fuel_metering(),
            max_wasm_stack_kb: defaults::max_wasm_stack_kb(),
            parallel_compilation: defaults::parallel_compilation(),
        }
    }
}

impl EngineConfig {
    /// Maximum guest stack size in bytes.
    pub fn max_wasm_stack_bytes(&self) -> usize {
        (self.max_wasm_stack_kb as usize) * 1024
    }
}

/// Per-run execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Export called once to hand control to the module.
    #[serde(default = "defaults::entry_point")]
    pub entry_point: String,

    /// Export called with a callback id each time a scheduled callback fires.
    #[serde(default = "defaults::callback_export")]
    pub callback_export: String,

    /// Fuel available to the whole run.
    ///
    /// Only effective when [`EngineConfig::fuel_metering`] is enabled.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            entry_point: defaults::entry_point(),
            callback_export: defaults::callback_export(),
            max_fuel: defaults::max_fuel(),
        }
    }
}

/// Capability shim configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CapabilityConfig {
    /// How the text decoder treats malformed UTF-8.
    #[serde(default)]
    pub decode_policy: DecodePolicy,

    /// Directory that relative guest paths resolve against.
    ///
    /// Defaults to the process working directory.
    #[serde(default)]
    pub fs_root: Option<PathBuf>,
}

impl CapabilityConfig {
    /// Root directory for relative guest paths, if configured.
    pub fn fs_root(&self) -> Option<&Path> {
        self.fs_root.as_deref()
    }
}

/// Policy applied when decoding bytes that are not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Reject the whole input with an encoding error.
    #[default]
    Strict,
    /// Substitute U+FFFD for each maximal invalid subsequence.
    Replace,
}

impl fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodePolicy::Strict => write!(f, "strict"),
            DecodePolicy::Replace => write!(f, "replace"),
        }
    }
}

impl FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(DecodePolicy::Strict),
            "replace" => Ok(DecodePolicy::Replace),
            other => Err(format!(
                "unknown decode policy '{other}' (expected 'strict' or 'replace')"
            )),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn fuel_metering() -> bool {
        false
    }

    pub const fn max_wasm_stack_kb() -> u32 {
        1024
    }

    pub const fn parallel_compilation() -> bool {
        true
    }

    pub fn entry_point() -> String {
        "_start".to_string()
    }

    pub fn callback_export() -> String {
        "resume".to_string()
    }

    pub const fn max_fuel() -> u64 {
        10_000_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(!config.engine.fuel_metering);
        assert_eq!(config.engine.max_wasm_stack_kb, 1024);
        assert!(config.engine.parallel_compilation);

        assert_eq!(config.execution.entry_point, "_start");
        assert_eq!(config.execution.callback_export, "resume");
        assert_eq!(config.execution.max_fuel, 10_000_000_000);

        assert_eq!(config.capabilities.decode_policy, DecodePolicy::Strict);
        assert!(config.capabilities.fs_root().is_none());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = RuntimeConfig::default();
        config.capabilities.decode_policy = DecodePolicy::Replace;

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"replace\""));

        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.capabilities.decode_policy, DecodePolicy::Replace);
        assert_eq!(config.execution.max_fuel, deserialized.execution.max_fuel);
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"execution": {"entry_point": "run"}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();

        // Explicitly set value
        assert_eq!(config.execution.entry_point, "run");
        // Default values for unspecified fields
        assert_eq!(config.execution.callback_export, "resume");
        assert!(!config.engine.fuel_metering);
    }

    #[test]
    fn test_stack_bytes() {
        let config = EngineConfig {
            max_wasm_stack_kb: 2,
            ..Default::default()
        };
        assert_eq!(config.max_wasm_stack_bytes(), 2048);
    }

    #[test]
    fn test_decode_policy_from_str() {
        assert_eq!("strict".parse::<DecodePolicy>(), Ok(DecodePolicy::Strict));
        assert_eq!("Replace".parse::<DecodePolicy>(), Ok(DecodePolicy::Replace));
        assert!("lossy".parse::<DecodePolicy>().is_err());
        assert_eq!(DecodePolicy::Replace.to_string(), "replace");
    }
}
