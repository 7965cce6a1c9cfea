//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the runtime. It is:
//! - Created once per process and shared by the loader and the runner
//! - Set up for async execution so callback waits yield to tokio
//! - Optionally configured with fuel metering for CPU limiting

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine};

use shimrun_common::{EngineConfig, RuntimeError};

/// Stack the async fiber gets on top of the guest's own stack limit.
const ASYNC_STACK_HEADROOM: usize = 1024 * 1024;

/// Thread-safe WebAssembly engine wrapper.
///
/// # Configuration
///
/// The engine is configured with:
/// - **Async Support**: Lets the runner await timers between callbacks
/// - **Fuel Metering**: Optional deterministic CPU limiting
/// - **Guest Stack Limit**: Sized for deep runtime initialization
///
/// # Example
///
/// ```ignore
/// use shimrun_common::EngineConfig;
/// use shimrun_core::WasmEngine;
///
/// let config = EngineConfig::default();
/// let engine = WasmEngine::new(&config)?;
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        if config.max_wasm_stack_kb == 0 {
            return Err(RuntimeError::invalid_config(
                "max_wasm_stack_kb must be greater than zero",
            ));
        }

        let mut wasmtime_config = Config::new();

        // Enable async support for non-blocking callback waits
        wasmtime_config.async_support(true);

        let max_stack = config.max_wasm_stack_bytes();
        wasmtime_config.max_wasm_stack(max_stack);
        wasmtime_config.async_stack_size(max_stack + ASYNC_STACK_HEADROOM);

        if config.fuel_metering {
            wasmtime_config.consume_fuel(true);
        }

        wasmtime_config.parallel_compilation(config.parallel_compilation);
        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(
            fuel_metering = config.fuel_metering,
            max_wasm_stack_kb = config.max_wasm_stack_kb,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if fuel metering is enabled.
    pub fn is_fuel_metered(&self) -> bool {
        self.config.fuel_metering
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("fuel_metering", &self.config.fuel_metering)
            .field("max_wasm_stack_kb", &self.config.max_wasm_stack_kb)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation_default() {
        let config = EngineConfig::default();
        let engine = WasmEngine::new(&config);

        assert!(engine.is_ok());
        assert!(!engine.unwrap().is_fuel_metered());
    }

    #[test]
    fn test_engine_creation_with_fuel() {
        let config = EngineConfig {
            fuel_metering: true,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();
        assert!(engine.is_fuel_metered());
    }

    #[test]
    fn test_engine_rejects_zero_stack() {
        let config = EngineConfig {
            max_wasm_stack_kb: 0,
            ..Default::default()
        };
        let err = WasmEngine::new(&config).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig { .. }));
    }

    #[test]
    fn test_engine_large_stack() {
        // Larger than wasmtime's default async stack
        let config = EngineConfig {
            max_wasm_stack_kb: 4096,
            ..Default::default()
        };
        assert!(WasmEngine::new(&config).is_ok());
    }

    #[test]
    fn test_engine_debug() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();

        let debug_str = format!("{engine:?}");
        assert!(debug_str.contains("WasmEngine"));
        assert!(debug_str.contains("fuel_metering"));
    }
}
